use std::{
    fmt::Write as _,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use inkread::upload::{PDF_MIME_TYPE, SUPPORTED_IMAGE_TYPES, resolve_mime_type};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(
    name = "inkread-extract",
    about = "Upload images or PDFs to an inkread server and print the extracted text"
)]
struct Cli {
    /// Base URL of the inkread server.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server: String,
    /// File or directory to upload. Directories are walked recursively.
    #[arg(long)]
    input: PathBuf,
    /// Ask the model to expect handwriting.
    #[arg(long)]
    handwritten: bool,
    /// Write the combined text here instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Keep the server-side session after extraction.
    #[arg(long)]
    keep_session: bool,
}

#[derive(Deserialize)]
struct UploadReply {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    total_images: usize,
    #[serde(default)]
    suggestions: Vec<String>,
}

#[derive(Deserialize)]
struct ExtractReply {
    success: bool,
    classification: String,
    message: String,
    #[serde(default)]
    suggestions: Vec<String>,
    #[serde(default)]
    error_details: Option<String>,
    total_files_processed: usize,
    combined_text: String,
    total_duration_seconds: f64,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let files = collect_files(&cli.input)?;
    if files.is_empty() {
        bail!("no supported files found under {}", cli.input.display());
    }

    let server = cli.server.trim_end_matches('/');
    let client = reqwest::Client::new();

    let upload = upload_files(&client, server, &files).await?;
    let session_id = upload
        .session_id
        .ok_or_else(|| anyhow!("server did not return a session id"))?;
    eprintln!(
        "Uploaded {} file(s) as {} item(s), session {session_id}",
        files.len(),
        upload.total_images
    );

    let extract: ExtractReply = client
        .post(format!("{server}/extract-text"))
        .json(&json!({ "session_id": session_id, "handwritten": cli.handwritten }))
        .send()
        .await
        .context("extract request failed")?
        .json()
        .await
        .context("failed to parse extract response")?;

    if !cli.keep_session {
        let _ = client
            .delete(format!("{server}/session/{session_id}"))
            .send()
            .await;
    }

    eprintln!("{}", report(&extract));
    if !extract.success {
        bail!("extraction failed: {}", extract.message);
    }

    match &cli.output {
        Some(path) => write_string(path, &extract.combined_text),
        None => {
            println!("{}", extract.combined_text);
            Ok(())
        }
    }
}

fn collect_files(input: &Path) -> Result<Vec<PathBuf>> {
    if !input.exists() {
        bail!("input path {} does not exist", input.display());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(input)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && is_supported(e.path()))
        .map(walkdir::DirEntry::into_path)
        .collect();
    files.sort();
    Ok(files)
}

fn is_supported(path: &Path) -> bool {
    let mime = resolve_mime_type(&display_name(path), None);
    mime == PDF_MIME_TYPE || SUPPORTED_IMAGE_TYPES.contains(&mime.as_str())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

async fn upload_files(
    client: &reqwest::Client,
    server: &str,
    files: &[PathBuf],
) -> Result<UploadReply> {
    let mut form = Form::new();
    for path in files {
        let data =
            fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let name = display_name(path);
        let mime = resolve_mime_type(&name, None);
        let part = Part::bytes(data)
            .file_name(name)
            .mime_str(&mime)
            .with_context(|| format!("invalid content type {mime}"))?;
        form = form.part("files", part);
    }

    let reply: UploadReply = client
        .post(format!("{server}/upload-files"))
        .multipart(form)
        .send()
        .await
        .context("upload request failed")?
        .json()
        .await
        .context("failed to parse upload response")?;

    if !reply.success {
        let mut detail = reply.message.clone();
        for hint in &reply.suggestions {
            let _ = write!(detail, "\n  - {hint}");
        }
        bail!("upload rejected: {detail}");
    }
    Ok(reply)
}

fn report(extract: &ExtractReply) -> String {
    let mut out = format!(
        "{} ({}): {} file(s) in {:.1}s\n{}",
        extract.classification,
        if extract.success { "ok" } else { "failed" },
        extract.total_files_processed,
        extract.total_duration_seconds,
        extract.message
    );
    if let Some(details) = &extract.error_details {
        let _ = write!(out, "\n{details}");
    }
    for hint in &extract.suggestions {
        let _ = write!(out, "\n  - {hint}");
    }
    out
}

fn write_string(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| {
            format!(
                "failed to create parent directories for {}",
                parent.display()
            )
        })?;
    }
    let mut file = fs::File::create(path)
        .with_context(|| format!("failed to create file at {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("failed to write data to {}", path.display()))?;
    Ok(())
}
