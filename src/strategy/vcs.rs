use std::path::Path;
use std::sync::Arc;
use crate::driver::{Invocation, SyncDriver};
use crate::error::{Error, Result};
use crate::overlay::{Overlay, Source};
use crate::settings::CommandTemplate;
use super::{SyncStrategy, remove_dir_if_exists, run_post_sync};

/// Version control systems and other tools that check content out into a
/// directory and update it in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vcs {
    Git,
    Mercurial,
    Bzr,
    Svn,
    Cvs,
    Darcs,
    Rsync,
}

impl Vcs {
    pub const ALL: [Vcs; 7] = [
        Vcs::Git,
        Vcs::Mercurial,
        Vcs::Bzr,
        Vcs::Svn,
        Vcs::Cvs,
        Vcs::Darcs,
        Vcs::Rsync,
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Vcs::Git => "git",
            Vcs::Mercurial => "mercurial",
            Vcs::Bzr => "bzr",
            Vcs::Svn => "svn",
            Vcs::Cvs => "cvs",
            Vcs::Darcs => "darcs",
            Vcs::Rsync => "rsync",
        }
    }
}

const RSYNC_OPTS: [&str; 9] = [
    "-rlptDvz",
    "--progress",
    "--delete",
    "--delete-after",
    "--timeout=180",
    "--exclude=distfiles/*",
    "--exclude=local/*",
    "--exclude=packages/*",
    "--",
];

pub struct VcsStrategy {
    vcs: Vcs,
    template: CommandTemplate,
    driver: Arc<dyn SyncDriver>,
}

impl VcsStrategy {
    pub fn new(vcs: Vcs, template: CommandTemplate, driver: Arc<dyn SyncDriver>) -> Self {
        Self { vcs, template, driver }
    }

    fn invocation(&self) -> Invocation {
        Invocation::new(&self.template.command)
    }

    fn add_invocation(&self, source: &Source, target: &Path) -> Result<Invocation> {
        let opts = self.template.add_args()?;
        let branch = Some(source.branch.as_str()).filter(|b| !b.is_empty());
        let invocation = match self.vcs {
            Vcs::Git => {
                let mut inv = self.invocation().arg("clone").args(&opts);
                if let Some(branch) = branch {
                    inv = inv.args(["-b", branch]);
                }
                inv.arg(&source.uri).path_arg(target)
            }
            Vcs::Mercurial => {
                let mut inv = self.invocation().arg("clone").args(&opts);
                if let Some(branch) = branch {
                    inv = inv.args(["-b", branch]);
                }
                inv.arg(&source.uri).path_arg(target)
            }
            Vcs::Bzr => self.invocation().arg("branch").args(&opts).arg(&source.uri).path_arg(target),
            Vcs::Svn => self.invocation().arg("co").args(&opts).arg(&source.uri).path_arg(target),
            Vcs::Darcs => self
                .invocation()
                .args(["get", "--partial"])
                .args(&opts)
                .arg(&source.uri)
                .path_arg(target),
            Vcs::Cvs => {
                let name = dir_name(target)?;
                let parent = target.parent().unwrap_or(Path::new("."));
                self.invocation()
                    .args(["-d", source.uri.as_str(), "checkout"])
                    .args(&opts)
                    .args(["-d", name.as_str(), branch.unwrap_or(name.as_str())])
                    .current_dir(parent)
            }
            Vcs::Rsync => self.rsync_invocation(source, target, opts),
        };
        Ok(invocation)
    }

    fn sync_invocation(&self, source: &Source, target: &Path) -> Result<Invocation> {
        let opts = self.template.sync_args()?;
        let invocation = match self.vcs {
            Vcs::Git => self.invocation().arg("pull").args(&opts),
            Vcs::Mercurial => self.invocation().args(["pull", "-u"]).args(&opts),
            Vcs::Bzr => self.invocation().args(["pull", "--overwrite"]).args(&opts),
            Vcs::Svn => self.invocation().arg("up").args(&opts),
            Vcs::Cvs => self.invocation().args(["update", "-d"]).args(&opts),
            Vcs::Darcs => self.invocation().args(["pull", "--all"]).args(&opts),
            Vcs::Rsync => return Ok(self.rsync_invocation(source, target, opts)),
        };
        Ok(invocation.current_dir(target))
    }

    fn rsync_invocation(&self, source: &Source, target: &Path, opts: Vec<String>) -> Invocation {
        let (head, tail) = RSYNC_OPTS.split_at(RSYNC_OPTS.len() - 1);
        let mut uri = source.uri.clone();
        if !uri.ends_with('/') {
            uri.push('/');
        }
        self.invocation()
            .args(head)
            .args(&opts)
            .args(tail)
            .arg(uri)
            .path_arg(target)
    }

    fn run(&self, overlay: &Overlay, invocation: &Invocation) -> Result<()> {
        self.driver
            .run(invocation)
            .map_err(|e| Error::sync_failed(&overlay.name, e.to_string()))
    }
}

fn dir_name(target: &Path) -> Result<String> {
    target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::Io(std::io::Error::other(format!("{} has no file name", target.display()))))
}

impl SyncStrategy for VcsStrategy {
    fn kind(&self) -> &str {
        self.vcs.kind()
    }

    fn add(&self, overlay: &Overlay, source: &Source, target: &Path) -> Result<()> {
        if self.vcs == Vcs::Rsync {
            std::fs::create_dir_all(target)?;
        }
        let invocation = self.add_invocation(source, target)?;
        self.run(overlay, &invocation)?;
        run_post_sync(self.driver.as_ref(), &self.template, overlay, target)
    }

    fn sync(&self, overlay: &Overlay, source: &Source, target: &Path) -> Result<()> {
        let invocation = self.sync_invocation(source, target)?;
        self.run(overlay, &invocation)?;
        run_post_sync(self.driver.as_ref(), &self.template, overlay, target)
    }

    fn delete(&self, _overlay: &Overlay, target: &Path) -> Result<()> {
        remove_dir_if_exists(target)
    }
}
