//! CLI entry point for `attachspool`.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use attachspool::config::Config;
use attachspool::error::SpoolError;
use attachspool::model::{read_attachments, FileAttachment, MimeContent, MimeSummary};
use attachspool::store::{ByteSource, FileSource, SharedSource};
use attachspool::xml::element_names::{ATTACHMENTS, FILE_ATTACHMENT, MIME_CONTENT};
use attachspool::xml::{XmlStreamReader, XmlStreamWriter};

#[derive(Parser)]
#[command(name = "attachspool", version, about = "Stream file attachments and MIME content in and out of base64 XML")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Keep decoded payloads up to this many bytes in memory
    #[arg(long, value_name = "BYTES", global = true)]
    spool_threshold: Option<usize>,

    /// Server version to write for (e.g. Exchange2010_SP2)
    #[arg(long, value_name = "VERSION", global = true)]
    server_version: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Wrap a file as a FileAttachment (or MimeContent) XML document
    Wrap {
        path: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Write a MimeContent element instead of a FileAttachment
        #[arg(long)]
        mime: bool,
        /// Character set of MIME content
        #[arg(long, default_value = "UTF-8")]
        charset: String,
        /// Attachment name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
        /// Mark the attachment as a contact photo
        #[arg(long)]
        contact_photo: bool,
    },
    /// Extract the payload of a FileAttachment or MimeContent document
    Unwrap {
        path: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Describe the payloads of a document
    Inspect {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Write the effective configuration to the config file
    InitConfig {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = attachspool::config::load_config();
    if let Some(threshold) = cli.spool_threshold {
        config.spool.threshold = threshold;
    }
    if let Some(version) = &cli.server_version {
        config.general.server_version = version.clone();
    }

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match cli.command {
        Commands::Wrap {
            path,
            output,
            mime,
            charset,
            name,
            content_type,
            contact_photo,
        } => {
            let options = WrapOptions {
                mime,
                charset,
                name,
                content_type,
                contact_photo,
            };
            cmd_wrap(&path, &output, &options, &config)
        }
        Commands::Unwrap { path, output } => cmd_unwrap(&path, &output, &config),
        Commands::Inspect { path, json } => cmd_inspect(&path, json, &config),
        Commands::InitConfig { force } => cmd_init_config(&config, force),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}

fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = attachspool::config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "attachspool.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Save the effective configuration (file, defaults and flags combined).
fn cmd_init_config(config: &Config, force: bool) -> anyhow::Result<()> {
    let path = attachspool::config::config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    let saved = attachspool::config::save_config(config)?;
    println!("  Wrote {}", saved.display());
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "attachspool", &mut std::io::stdout());
    Ok(())
}

struct WrapOptions {
    mime: bool,
    charset: String,
    name: Option<String>,
    content_type: Option<String>,
    contact_photo: bool,
}

/// A file source that advances a progress bar as it is read.
struct ProgressSource {
    inner: FileSource,
    bar: ProgressBar,
}

impl ByteSource for ProgressSource {
    fn open_stream(&self) -> io::Result<Box<dyn Read + '_>> {
        self.bar.set_position(0);
        Ok(Box::new(self.bar.wrap_read(self.inner.open_stream()?)))
    }

    fn size(&self) -> io::Result<u64> {
        self.inner.size()
    }
}

fn byte_bar(total: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} {label} [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{eta}})"
            ))
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb
}

/// Wrap a file on disk into a base64 XML document.
fn cmd_wrap(path: &Path, output: &Path, options: &WrapOptions, config: &Config) -> anyhow::Result<()> {
    let version = config.server_version();
    let file_source = FileSource::open(path)?;
    let size = file_source.size()?;
    let bar = byte_bar(size, "Encoding");
    let source: SharedSource = Arc::new(ProgressSource {
        inner: file_source,
        bar: bar.clone(),
    });

    let start = Instant::now();
    let out = File::create(output).map_err(|e| SpoolError::io(output, e))?;
    let mut writer = XmlStreamWriter::new(BufWriter::new(out), version)
        .with_chunk_size(config.codec.encode_chunk_size);
    writer.write_declaration()?;

    if options.mime {
        MimeContent::with_content(options.charset.clone(), source).write_to_xml(&mut writer)?;
    } else {
        let name = options.name.clone().unwrap_or_else(|| {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "attachment".to_string())
        });
        let mut attachment = FileAttachment::with_content(version, name, source);
        if let Some(content_type) = &options.content_type {
            attachment.set_content_type(content_type.clone());
        }
        if options.contact_photo {
            attachment.set_is_contact_photo(true)?;
        }
        attachment.write_to_xml(&mut writer)?;
    }

    writer.into_inner()?.flush()?;
    bar.finish_and_clear();

    println!(
        "  Wrapped {} ({}) into {} in {:.2?}",
        path.display(),
        format_size(size, BINARY),
        output.display(),
        start.elapsed()
    );
    Ok(())
}

/// Payloads read from a document.
enum Document {
    Attachments(Vec<FileAttachment>),
    Mime(MimeContent),
}

fn load_document(path: &Path, config: &Config) -> anyhow::Result<Document> {
    let version = config.server_version();
    let file = File::open(path).map_err(|e| SpoolError::io(path, e))?;
    let mut reader =
        XmlStreamReader::new(BufReader::new(file)).with_spool_options(config.spool_options());

    let root = reader.read_any_start_element()?;
    let document = match root.as_str() {
        FILE_ATTACHMENT => Document::Attachments(vec![FileAttachment::read_from_xml(&mut reader, version)?]),
        ATTACHMENTS => Document::Attachments(read_attachments(&mut reader, version)?),
        MIME_CONTENT => Document::Mime(MimeContent::read_from_xml(&mut reader)?),
        other => anyhow::bail!("Unsupported document root <{other}>"),
    };
    Ok(document)
}

/// Decode a document's payload into a plain file.
fn cmd_unwrap(path: &Path, output: &Path, config: &Config) -> anyhow::Result<()> {
    let start = Instant::now();
    let document = load_document(path, config)?;

    let source = match &document {
        Document::Attachments(attachments) => attachments
            .first()
            .and_then(|a| a.content())
            .ok_or_else(|| anyhow::anyhow!("Document contains no attachment content"))?,
        Document::Mime(mime) => mime
            .content()
            .ok_or_else(|| anyhow::anyhow!("Document contains no MIME content"))?,
    };

    let size = source.size()?;
    let bar = byte_bar(size, "Writing");
    let file = File::create(output).map_err(|e| SpoolError::io(output, e))?;
    let mut out = bar.wrap_write(BufWriter::new(file));
    let written = io::copy(&mut source.open_stream()?, &mut out)?;
    out.flush()?;
    bar.finish_and_clear();

    println!(
        "  Extracted {} to {} in {:.2?}",
        format_size(written, BINARY),
        output.display(),
        start.elapsed()
    );
    println!("  SHA-256: {}", source.sha256()?);
    Ok(())
}

/// One payload as reported by `inspect`.
#[derive(Serialize)]
struct PayloadReport {
    kind: &'static str,
    name: Option<String>,
    content_type: Option<String>,
    character_set: Option<String>,
    size: u64,
    spilled: bool,
    sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<MimeSummary>,
}

/// Print a description of every payload in a document.
fn cmd_inspect(path: &Path, json: bool, config: &Config) -> anyhow::Result<()> {
    let document = load_document(path, config)?;
    let mut reports = Vec::new();

    match &document {
        Document::Attachments(attachments) => {
            for attachment in attachments {
                let Some(source) = attachment.content() else {
                    continue;
                };
                reports.push(PayloadReport {
                    kind: "file-attachment",
                    name: attachment.name().map(str::to_string),
                    content_type: attachment.content_type().map(str::to_string),
                    character_set: None,
                    size: source.size()?,
                    spilled: attachment
                        .spooled_content()
                        .is_some_and(|spool| spool.is_spilled()),
                    sha256: source.sha256()?,
                    summary: None,
                });
            }
        }
        Document::Mime(mime) => {
            if let Some(source) = mime.content() {
                reports.push(PayloadReport {
                    kind: "mime-content",
                    name: None,
                    content_type: Some("message/rfc822".to_string()),
                    character_set: mime.character_set().map(str::to_string),
                    size: source.size()?,
                    spilled: mime.spooled_content().is_some_and(|spool| spool.is_spilled()),
                    sha256: source.sha256()?,
                    summary: Some(mime.summary()?),
                });
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!();
    println!("  Document:   {}", path.display());
    println!("  Version:    {}", config.server_version());
    println!("  Payloads:   {}", reports.len());
    for report in &reports {
        println!();
        println!("  Kind:       {}", report.kind);
        if let Some(name) = &report.name {
            println!("  Name:       {name}");
        }
        if let Some(content_type) = &report.content_type {
            println!("  Type:       {content_type}");
        }
        if let Some(charset) = &report.character_set {
            println!("  Charset:    {charset}");
        }
        println!(
            "  Size:       {} ({})",
            format_size(report.size, BINARY),
            if report.spilled { "spooled to disk" } else { "in memory" }
        );
        println!("  SHA-256:    {}", report.sha256);
        if let Some(summary) = &report.summary {
            println!("  Subject:    {}", summary.subject.as_deref().unwrap_or("-"));
            println!("  From:       {}", summary.from.as_deref().unwrap_or("-"));
            println!("  Attached:   {}", summary.attachment_count);
        }
    }
    println!();
    Ok(())
}
