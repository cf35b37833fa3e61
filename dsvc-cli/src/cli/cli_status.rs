//! `dsvc status [--json]` (spec §4.5/§10.5): reports whether the repo is
//! mid-merge and, if so, which primary keys still need resolving. grounded
//! in the teacher's `BitStatusCliOpts` (`bit/src/cli/cli_status.rs`), but
//! reports [`RepoState`]/[`MergeIndex`] rather than a worktree status -
//! there is no worktree in this crate's scope.

use crate::cli::Cmd;
use clap::Args;
use dsvc_core::{DsvcResult, RepoState, Repository};
use serde::Serialize;

#[derive(Args, Debug)]
pub struct DsvcStatusCliOpts {
    /// emit status as JSON instead of plain text
    #[clap(long)]
    pub json: bool,
}

impl Cmd for DsvcStatusCliOpts {
    fn exec(self, repo: &Repository<'_>) -> DsvcResult<()> {
        let state = repo.merge_state();
        let branch = repo.refs().current_branch()?;

        match state.repo_state() {
            RepoState::Normal => {
                if self.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&JsonStatus {
                            branch,
                            merging: false,
                            conflicts: Vec::new(),
                        })?
                    );
                } else {
                    println!("on branch {}", branch.as_deref().unwrap_or("(detached)"));
                    println!("nothing to merge");
                }
            }
            RepoState::Merging => {
                let index = state.merge_index()?.unwrap_or_default();
                let conflicts: Vec<JsonConflict> = index
                    .unresolved()
                    .map(|c| JsonConflict { dataset: c.dataset_path.clone(), pk: c.pk.to_string() })
                    .collect();

                if self.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&JsonStatus {
                            branch,
                            merging: true,
                            conflicts,
                        })?
                    );
                } else {
                    println!("merging into {}", branch.as_deref().unwrap_or("(detached)"));
                    if conflicts.is_empty() {
                        println!("all conflicts resolved; run `dsvc merge --continue`");
                    } else {
                        println!("unresolved conflicts:");
                        for c in &conflicts {
                            println!("  {}:{}", c.dataset, c.pk);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonStatus {
    branch: Option<String>,
    merging: bool,
    conflicts: Vec<JsonConflict>,
}

#[derive(Serialize)]
struct JsonConflict {
    dataset: String,
    pk: String,
}
