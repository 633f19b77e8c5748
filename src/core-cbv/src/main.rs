use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use core_cbv::{
    GitFetcher, RepoUrl, SourceFetcher, TimeUnit, Workspace, attach_permalinks, build_hierarchy,
    get_allowed_source_hosts, get_poll_interval, get_poll_max_attempts, get_workspace_root, setup_logging,
    validate_branch, walk,
};
use data_model_cbv::models::{DEFAULT_BRANCH, Job, JobStatus, SubmitPayload, SubmitResponse};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "codebase-viz")]
#[command(about = "Repository ingestion toolkit: walk, build trees, submit jobs", long_about = None)]
struct CoreCli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a local directory and print its flat node list as JSON
    Walk {
        #[arg(short, long, value_parser = validate_input_dir)]
        dir: PathBuf,
    },

    /// Fetch a repository, walk it and print the result as JSON, without a database
    Tree {
        /// Source repository, e.g. https://github.com/octocat/Hello-World
        #[arg(short, long)]
        url: String,
        /// Branch to fetch; the remote default branch otherwise
        #[arg(short, long)]
        branch: Option<String>,
        #[arg(short, long, value_enum, default_value_t = Format::Hierarchical)]
        format: Format,
    },

    /// Submit a repository to a running API and wait for the job to finish
    Submit {
        #[arg(short, long)]
        url: String,
        #[arg(short = 'n', long)]
        display_name: Option<String>,
        #[arg(short, long)]
        branch: Option<String>,
        /// Base URL of the API
        #[arg(short, long, default_value = "http://127.0.0.1:3001")]
        api: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Flat,
    Hierarchical,
}

fn validate_input_dir(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);
    if !path.is_dir() {
        return Err(format!("Not a directory: {}", path.display()));
    }
    Ok(path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    setup_logging("core_cbv=info");

    let cli = CoreCli::parse();

    match cli.command {
        Commands::Walk { dir } => {
            let output = walk(&dir).await?;
            tracing::info!(
                "Walked {}: {} entries, {} skipped",
                dir.display(),
                output.entries.len(),
                output.skipped_count()
            );
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Tree { url, branch, format } => {
            let source = RepoUrl::parse(&url, &get_allowed_source_hosts())?;
            let branch = branch.as_deref().map(validate_branch).transpose()?;
            let json = local_tree(&source, branch.as_deref(), format).await?;
            println!("{}", json);
        }

        Commands::Submit {
            url,
            display_name,
            branch,
            api,
        } => {
            let job = submit_and_wait(&api, url, display_name, branch).await?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            if job.status == JobStatus::Failed {
                bail!("Job {} failed: {}", job.id, job.error_message.unwrap_or_default());
            }
        }
    }

    Ok(())
}

/// Runs fetch and walk in a throwaway workspace and renders the result.
async fn local_tree(source: &RepoUrl, branch: Option<&str>, format: Format) -> anyhow::Result<String> {
    let workspace = Workspace::create(&get_workspace_root(), Uuid::new_v4()).await?;

    let walked = async {
        let checkout = GitFetcher::default().fetch(source, branch, &workspace).await?;
        Ok::<_, core_cbv::Error>(walk(&checkout).await?)
    }
    .await;
    workspace.release().await?;
    let output = walked?;

    if output.skipped_count() > 0 {
        tracing::warn!("{} entries could not be read and were skipped", output.skipped_count());
    }

    let branch = branch.unwrap_or(DEFAULT_BRANCH);
    let nodes = output.into_nodes(Uuid::new_v4());
    let json = match format {
        Format::Flat => serde_json::to_string_pretty(&attach_permalinks(nodes, source.as_str(), branch))?,
        Format::Hierarchical => serde_json::to_string_pretty(&build_hierarchy(&nodes, source.as_str(), branch)?)?,
    };
    Ok(json)
}

/// POSTs the job, then polls its status with the bounded retry policy until it is terminal.
async fn submit_and_wait(
    api: &str,
    source_url: String,
    display_name: Option<String>,
    branch: Option<String>,
) -> anyhow::Result<Job> {
    let api = api.trim_end_matches('/');
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/process", api))
        .json(&SubmitPayload {
            source_url: Some(source_url),
            display_name,
            branch,
        })
        .send()
        .await
        .with_context(|| format!("Cannot reach the API at {}", api))?;
    if !response.status().is_success() {
        let status = response.status();
        bail!("Submission rejected ({}): {}", status, response.text().await.unwrap_or_default());
    }
    let submitted: SubmitResponse = response.json().await?;
    tracing::info!("[job: {}] Submitted {}", submitted.job_id, submitted.source_url);

    let interval: Duration = get_poll_interval(TimeUnit::Milliseconds, "POLL_INTERVAL_MS", 1000);
    let max_attempts = get_poll_max_attempts();

    for attempt in 1..=max_attempts {
        tokio::time::sleep(interval).await;

        let job: Job = client
            .get(format!("{}{}", api, submitted.status_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        tracing::debug!("[job: {}] Poll {}/{}: {}", job.id, attempt, max_attempts, job.status);

        if job.status.is_terminal() {
            return Ok(job);
        }
    }

    bail!(
        "Job {} did not finish after {} polls; check GET {}{}",
        submitted.job_id,
        max_attempts,
        api,
        submitted.status_url
    )
}
