use async_trait::async_trait;
use git2::{Cred, CredentialType, PushOptions, RemoteCallbacks, Repository, RepositoryInitOptions, Signature};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::app::ports::{PublishOutcome, PublishPort};
use crate::config::VersioningConfig;
use crate::error::{PipelineError, Result};

/// Versions the output file in a git repository: stage, commit, and push
/// to the configured remote when one exists.
#[derive(Debug, Clone)]
pub struct GitPublisher {
    repo_dir: PathBuf,
    remote: String,
    branch: String,
    author_name: String,
    author_email: String,
}

impl GitPublisher {
    pub fn new(repo_dir: PathBuf, config: &VersioningConfig) -> Self {
        Self {
            repo_dir,
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            author_name: config.author_name.clone(),
            author_email: config.author_email.clone(),
        }
    }

    /// Open the repository, initialising it on `branch` if there is none yet
    fn open_or_init(&self) -> Result<Repository> {
        if let Ok(repo) = Repository::open(&self.repo_dir) {
            return Ok(repo);
        }
        fs::create_dir_all(&self.repo_dir)?;
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(&self.branch);
        let repo = Repository::init_opts(&self.repo_dir, &opts)?;
        info!("Initialized new git repository at {}", self.repo_dir.display());
        Ok(repo)
    }

    /// Commit `file` if its content differs from HEAD
    pub fn commit_file(&self, file: &Path, message: &str) -> Result<PublishOutcome> {
        let repo = self.open_or_init()?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| PipelineError::Config(format!("{} is a bare repository", self.repo_dir.display())))?
            .canonicalize()?;
        let file = file.canonicalize()?;
        let relative = file.strip_prefix(&workdir).map_err(|_| {
            PipelineError::Config(format!(
                "{} is outside the repository at {}",
                file.display(),
                workdir.display()
            ))
        })?;

        let mut index = repo.index()?;
        index.add_path(relative)?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;

        let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
        if parent.as_ref().map(|p| p.tree_id()) == Some(tree_id) {
            debug!("{} unchanged since last commit", relative.display());
            return Ok(PublishOutcome::Unchanged);
        }

        let signature = Signature::now(&self.author_name, &self.author_email)?;
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let commit_id = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
        info!("Committed {} as {}", relative.display(), commit_id);

        let pushed = match repo.find_remote(&self.remote) {
            Ok(_) => match self.push(&repo) {
                Ok(()) => true,
                Err(e) => {
                    error!("Push to '{}' failed: {}", self.remote, e);
                    false
                }
            },
            Err(_) => {
                debug!("No remote '{}' configured; skipping push", self.remote);
                false
            }
        };

        Ok(PublishOutcome::Committed {
            commit_id: commit_id.to_string(),
            pushed,
        })
    }

    fn push(&self, repo: &Repository) -> Result<()> {
        let head = repo.head()?;
        let head_ref = head
            .name()
            .ok_or_else(|| PipelineError::Config("HEAD is not a valid UTF-8 reference".to_string()))?;
        let refspec = format!("{}:refs/heads/{}", head_ref, self.branch);

        let git_config = repo.config()?;
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(|url, username, allowed| {
            if allowed.contains(CredentialType::SSH_KEY) {
                if let Some(user) = username {
                    return Cred::ssh_key_from_agent(user);
                }
            }
            if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
                return Cred::credential_helper(&git_config, url, username);
            }
            Cred::default()
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(callbacks);

        let mut remote = repo.find_remote(&self.remote)?;
        remote.push(&[refspec.as_str()], Some(&mut options))?;
        info!("Pushed {} to '{}'", refspec, self.remote);
        Ok(())
    }
}

#[async_trait]
impl PublishPort for GitPublisher {
    async fn publish(&self, file: &Path, message: &str) -> Result<PublishOutcome> {
        // libgit2 blocks on disk and network
        let publisher = self.clone();
        let file = file.to_path_buf();
        let message = message.to_string();
        tokio::task::spawn_blocking(move || publisher.commit_file(&file, &message)).await?
    }
}
