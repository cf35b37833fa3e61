//! the `dsvc` CLI surface: `diff`, `status`, `merge`, each with a `--json`
//! rendering alongside its plain-text one. grounded in the teacher's
//! `BitCliOpts`/`BitSubCmd` split (`bit/src/cli.rs`), trimmed to the three
//! subcommands this spec exposes (no add/commit/checkout/branch/etc - those
//! mutate a worktree this core doesn't own).

mod cli_diff;
mod cli_merge;
mod cli_status;

use clap::{Parser, Subcommand};
use dsvc_core::{DsvcResult, Repository};
use std::ffi::OsString;
use std::path::PathBuf;

pub trait Cmd {
    fn exec(self, repo: &Repository<'_>) -> DsvcResult<()>;
}

pub fn run<T: Into<OsString> + Clone>(args: impl IntoIterator<Item = T>) -> DsvcResult<()> {
    let opts = DsvcCliOpts::parse_from(args);
    let (store, control_dir) = dsvc_core::repo_open::open(&opts.root_path)?;
    let repo = Repository::new(&store, control_dir);

    match opts.subcmd {
        DsvcSubCmd::Diff(opts) => opts.exec(&repo),
        DsvcSubCmd::Status(opts) => opts.exec(&repo),
        DsvcSubCmd::Merge(opts) => opts.exec(&repo),
    }
}

#[derive(Parser, Debug)]
#[clap(name = "dsvc", author, version, about = "versioned dataset core")]
pub struct DsvcCliOpts {
    #[clap(subcommand)]
    pub subcmd: DsvcSubCmd,
    /// run as if started in `<path>` instead of the current directory
    #[clap(short = 'C', default_value = ".")]
    pub root_path: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum DsvcSubCmd {
    /// show the structured diff between two revisions (spec §4.3/§10.5)
    Diff(cli_diff::DsvcDiffCliOpts),
    /// show the repository's merge state and any outstanding conflicts
    Status(cli_status::DsvcStatusCliOpts),
    /// three-way merge a branch into the current one (spec §4.5)
    Merge(cli_merge::DsvcMergeCliOpts),
}
