//! `dsvc diff [<spec>] [--json]` (spec §4.3/§10.5). grounded in the teacher's
//! `BitDiffCliOpts`/`Cmd` split (`bit/src/cli/cli_bit_diff.rs`), but the body
//! is new: the teacher's diff walks worktree files through `xdiff` and a
//! pager, this renders a [`dsvc_core::RepoDiff`] directly.
//!
//! a bare `<rev>` with no range operator diffs that revision against `HEAD`
//! - this CLI has no working copy wired in (spec §6 treats it as an external
//! collaborator), so there is no uncommitted state to diff a single
//! revision against.

use crate::cli::Cmd;
use clap::Args;
use dsvc_core::{DiffSpec, DsvcResult, PkFilter, RepoDiff, RepoPkFilter, Repository};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Args, Debug)]
pub struct DsvcDiffCliOpts {
    /// `<rev>`, `<a>..<b>` (via merge-base) or `<a>...<b>` (direct); defaults to `HEAD`
    #[clap(default_value = "HEAD")]
    pub spec: DiffSpec,
    /// emit the diff as JSON instead of plain text
    #[clap(long)]
    pub json: bool,
    /// restrict the diff to one dataset
    #[clap(long = "dataset")]
    pub dataset: Option<String>,
    /// exit with status 1 if the diff is non-empty, printing nothing
    #[clap(long = "exit-code")]
    pub exit_code: bool,
}

impl Cmd for DsvcDiffCliOpts {
    fn exec(self, repo: &Repository<'_>) -> DsvcResult<()> {
        let (base, target) = repo.resolve_diff_spec(&self.spec)?;

        let filter = match &self.dataset {
            Some(path) => {
                let mut only = BTreeMap::new();
                only.insert(path.clone(), PkFilter::Unfiltered);
                RepoPkFilter::Only(only)
            }
            None => RepoPkFilter::Unfiltered,
        };

        let diff = repo.repo_diff(&base, &target, &filter)?;

        if self.exit_code {
            std::process::exit(if diff.is_empty() { 0 } else { 1 });
        }

        if self.json {
            println!("{}", serde_json::to_string_pretty(&JsonDiff::from(&diff))?);
        } else {
            print_text(&diff);
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonDiff {
    datasets: Vec<JsonDatasetDiff>,
}

#[derive(Serialize)]
struct JsonDatasetDiff {
    path: String,
    inserts: usize,
    updates: usize,
    deletes: usize,
}

impl From<&RepoDiff> for JsonDiff {
    fn from(diff: &RepoDiff) -> Self {
        let datasets = diff
            .iter()
            .map(|(path, d)| JsonDatasetDiff {
                path: path.to_owned(),
                inserts: d.inserts.len(),
                updates: d.updates.len(),
                deletes: d.deletes.len(),
            })
            .collect();
        Self { datasets }
    }
}

fn print_text(diff: &RepoDiff) {
    if diff.is_empty() {
        println!("no changes");
        return;
    }
    for (path, ds_diff) in diff.iter() {
        println!("dataset {}", path);
        for pk in ds_diff.inserts.keys() {
            println!("  + {}", pk);
        }
        for pk in ds_diff.updates.keys() {
            println!("  ~ {}", pk);
        }
        for pk in ds_diff.deletes.keys() {
            println!("  - {}", pk);
        }
    }
}
