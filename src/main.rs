use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use devportal_certs::{
    CertificateClient, CertificateRecord, CertificateType, ClientConfig, PortalError, error,
    export_pkcs12_named, generate_signing_request, normalize_certificate_pem, success,
};

const SESSION_ENV: &str = "DEVPORTAL_MYACINFO";

#[derive(Parser)]
#[command(name = "devportal_certs")]
#[command(version, about = "Manage developer-portal signing certificates")]
struct Cli {
    /// Path to client config file (TOML)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// `myacinfo` session token (defaults to `DEVPORTAL_MYACINFO` env var)
    #[arg(long, global = true)]
    session: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a private key and certificate signing request
    Csr {
        #[arg(long)]
        common_name: String,
        #[arg(long)]
        email: String,
        /// Requested validity; the portal decides the actual period
        #[arg(long, default_value_t = 1)]
        years: u32,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Submit a CSR and save the issued certificate
    Create {
        #[arg(long = "type", value_parser = CertificateType::from_str)]
        certificate_type: CertificateType,
        /// CSR file produced by `csr`
        #[arg(long)]
        csr: PathBuf,
        #[arg(long)]
        team: Option<String>,
        /// Where to write the issued certificate (PEM)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List certificates for a team
    List {
        #[arg(long)]
        team: Option<String>,
        /// Filter as key=value, repeatable (e.g. certificateType=IOS_DEVELOPMENT)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
        #[arg(long)]
        limit: Option<u32>,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete (revoke) a certificate by id
    Delete {
        #[arg(long)]
        id: String,
        #[arg(long)]
        team: Option<String>,
    },
    /// Bundle a certificate and private key into a PKCS#12 file
    Export {
        /// Certificate file (PEM or bare base64)
        #[arg(long)]
        cert: PathBuf,
        /// Private key file (PEM)
        #[arg(long)]
        key: PathBuf,
        #[arg(long)]
        password: String,
        #[arg(long)]
        out: PathBuf,
        /// Friendly name stored in the archive (defaults to the certificate CN)
        #[arg(long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        match e.downcast_ref::<PortalError>() {
            Some(portal) if portal.is_remote() => error!("Developer portal: {portal}"),
            _ => error!("{e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Csr {
            common_name,
            email,
            years,
            out_dir,
        } => run_csr(&common_name, &email, years, &out_dir).await,
        Command::Export {
            cert,
            key,
            password,
            out,
            name,
        } => run_export(&cert, &key, &password, &out, name.as_deref()).await,
        Command::Create {
            certificate_type,
            csr,
            team,
            out,
        } => {
            let config = load_config(cli.config.as_deref()).await?;
            let session = resolve_session(cli.session)?;
            let team = resolve_team(team, &config)?;
            let client = CertificateClient::from_config(config)?;

            let csr_pem = tokio::fs::read_to_string(&csr)
                .await
                .with_context(|| format!("Failed to read CSR: {}", csr.display()))?;
            let record = client
                .create(certificate_type, &csr_pem, &team, &session)
                .await?;
            success!(
                "{} certificate issued: {}",
                certificate_type.display_name(),
                record.id
            );

            if let Some(out) = out {
                let content = record.cert_content().ok_or_else(|| {
                    anyhow::anyhow!("Portal response did not include certificate content")
                })?;
                tokio::fs::write(&out, normalize_certificate_pem(content).as_bytes())
                    .await
                    .with_context(|| format!("Failed to write certificate: {}", out.display()))?;
                success!("Certificate written to {}", out.display());
            }
            Ok(())
        }
        Command::List {
            team,
            mut filters,
            limit,
            json,
        } => {
            let config = load_config(cli.config.as_deref()).await?;
            let session = resolve_session(cli.session)?;
            let team = resolve_team(team, &config)?;
            let client = CertificateClient::from_config(config)?;

            if let Some(limit) = limit {
                filters.push(("limit".to_string(), limit.to_string()));
            }
            let records = client.list(filters, &team, &session).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for record in &records {
                    print_record(record);
                }
            }
            Ok(())
        }
        Command::Delete { id, team } => {
            let config = load_config(cli.config.as_deref()).await?;
            let session = resolve_session(cli.session)?;
            let team = resolve_team(team, &config)?;
            let client = CertificateClient::from_config(config)?;

            client.delete(&id, &team, &session).await?;
            success!("Certificate {id} deleted");
            Ok(())
        }
    }
}

async fn run_csr(common_name: &str, email: &str, years: u32, out_dir: &Path) -> Result<()> {
    let request = generate_signing_request(common_name, email, years)?;

    tokio::fs::create_dir_all(out_dir).await?;
    let csr_path = out_dir.join("request.csr");
    let key_path = out_dir.join("private.key");

    tokio::fs::write(&csr_path, request.csr_pem()).await?;
    write_private(&key_path, request.private_key_pem().as_bytes()).await?;

    success!("CSR written to {}", csr_path.display());
    success!("Private key written to {}", key_path.display());
    devportal_certs::warn!(
        "Keep the private key: it is required to export the issued certificate"
    );
    Ok(())
}

async fn run_export(
    cert: &Path,
    key: &Path,
    password: &str,
    out: &Path,
    name: Option<&str>,
) -> Result<()> {
    let cert_content = tokio::fs::read_to_string(cert)
        .await
        .with_context(|| format!("Failed to read certificate: {}", cert.display()))?;
    let key_pem = tokio::fs::read_to_string(key)
        .await
        .with_context(|| format!("Failed to read private key: {}", key.display()))?;

    let archive = export_pkcs12_named(&cert_content, &key_pem, password, name)?;
    write_private(out, &archive).await?;
    success!("PKCS#12 archive written to {}", out.display());
    Ok(())
}

/// Write a secret file, owner-readable only on unix.
async fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    }
    Ok(())
}

async fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    let config = match path {
        Some(path) => ClientConfig::load(path).await?,
        None => ClientConfig::load_default().await?,
    };
    Ok(config)
}

fn resolve_session(session: Option<String>) -> Result<String> {
    session
        .or_else(|| std::env::var(SESSION_ENV).ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow::anyhow!("No session token: pass --session or set {SESSION_ENV}"))
}

fn resolve_team(team: Option<String>, config: &ClientConfig) -> Result<String> {
    team.or_else(|| config.team_id.clone()).ok_or_else(|| {
        anyhow::anyhow!("No team id: pass --team or set team_id in the config file")
    })
}

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty filter key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn print_record(record: &CertificateRecord) {
    println!(
        "{}  {}  {}  {}",
        record.id,
        record.certificate_type().unwrap_or("-"),
        record.name().unwrap_or("-"),
        record.expiration_date().unwrap_or("-"),
    );
}
