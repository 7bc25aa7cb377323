use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, fmt, path::PathBuf};

const DEFAULT_PUBLIC_PATHS: [&str; 2] = ["/admin/", "/api/health/"];

/// Which object store the gateway writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Azure Blob Storage container.
    Azure,
    /// Directory on local disk, for development.
    Local,
}

/// How bearer tokens are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TokenMode {
    /// Decode claims only. The signature is never checked.
    Insecure,
    /// Verify the signature against the tenant's published key set.
    Verified,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

/// Settings for the blob storage backend.
#[derive(Clone)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub storage_dir: PathBuf,
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub container_name: String,
    pub use_azure_cli: bool,
}

// Hand-written so the account key never reaches the logs.
impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("backend", &self.backend)
            .field("storage_dir", &self.storage_dir)
            .field("account_name", &self.account_name)
            .field("account_key", &self.account_key.as_ref().map(|_| "<redacted>"))
            .field("container_name", &self.container_name)
            .field("use_azure_cli", &self.use_azure_cli)
            .finish()
    }
}

/// Settings for the token gate.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub mode: TokenMode,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    /// Path prefixes that skip authentication entirely.
    pub public_paths: Vec<String>,
}

impl AuthConfig {
    pub fn jwks_uri(&self) -> Option<String> {
        self.tenant_id.as_ref().map(|tenant| {
            format!("https://login.microsoftonline.com/{tenant}/discovery/v2.0/keys")
        })
    }

    pub fn issuer(&self) -> Option<String> {
        self.tenant_id
            .as_ref()
            .map(|tenant| format!("https://login.microsoftonline.com/{tenant}/v2.0"))
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Authenticated file upload gateway for blob storage")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Storage backend (overrides UPLOAD_GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Directory used by the local backend (overrides UPLOAD_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Azure storage account (overrides AZURE_STORAGE_ACCOUNT_NAME)
    #[arg(long)]
    pub account_name: Option<String>,

    /// Blob container (overrides AZURE_STORAGE_CONTAINER_NAME)
    #[arg(long)]
    pub container_name: Option<String>,

    /// Resolve Azure credentials through the Azure CLI (overrides AZURE_USE_CLI)
    #[arg(long)]
    pub use_azure_cli: bool,

    /// Azure AD tenant (overrides MSAL_TENANT_ID)
    #[arg(long)]
    pub tenant_id: Option<String>,

    /// Azure AD application id used as token audience (overrides MSAL_CLIENT_ID)
    #[arg(long)]
    pub client_id: Option<String>,

    /// Token checking mode (overrides UPLOAD_GATEWAY_TOKEN_MODE)
    #[arg(long, value_enum)]
    pub token_mode: Option<TokenMode>,

    /// Path prefix that skips authentication, repeatable (overrides UPLOAD_GATEWAY_PUBLIC_PATHS)
    #[arg(long = "public-path")]
    pub public_paths: Vec<String>,

    /// Print a demo token for insecure token mode and exit
    #[arg(long)]
    pub mint_test_token: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the mint-token flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();
        let mint = args.mint_test_token;
        let cfg = Self::from_args(args, |name| env::var(name).ok())?;
        Ok((cfg, mint))
    }

    /// Merge parsed arguments with values looked up by environment variable name.
    pub fn from_args(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = lookup("UPLOAD_GATEWAY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match lookup("UPLOAD_GATEWAY_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing UPLOAD_GATEWAY_PORT value `{}`", value))?,
            None => 8000,
        };
        let env_backend = match lookup("UPLOAD_GATEWAY_BACKEND") {
            Some(value) => BackendKind::from_str(&value, true)
                .map_err(|err| anyhow::anyhow!("parsing UPLOAD_GATEWAY_BACKEND: {err}"))?,
            None => BackendKind::Azure,
        };
        let env_mode = match lookup("UPLOAD_GATEWAY_TOKEN_MODE") {
            Some(value) => TokenMode::from_str(&value, true)
                .map_err(|err| anyhow::anyhow!("parsing UPLOAD_GATEWAY_TOKEN_MODE: {err}"))?,
            None => TokenMode::Verified,
        };
        let env_storage = lookup("UPLOAD_GATEWAY_STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/objects"));
        let env_container =
            lookup("AZURE_STORAGE_CONTAINER_NAME").unwrap_or_else(|| "uploads".into());
        let env_use_cli = lookup("AZURE_USE_CLI")
            .map(|value| parse_flag(&value))
            .unwrap_or(false);
        let env_public_paths = lookup("UPLOAD_GATEWAY_PUBLIC_PATHS")
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|| DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect());

        // --- Merge ---
        let auth = AuthConfig {
            mode: args.token_mode.unwrap_or(env_mode),
            tenant_id: args
                .tenant_id
                .or_else(|| lookup("MSAL_TENANT_ID"))
                .filter(|v| !v.is_empty()),
            client_id: args
                .client_id
                .or_else(|| lookup("MSAL_CLIENT_ID"))
                .filter(|v| !v.is_empty()),
            public_paths: if args.public_paths.is_empty() {
                env_public_paths
            } else {
                args.public_paths
            },
        };

        if auth.mode == TokenMode::Verified && (auth.tenant_id.is_none() || auth.client_id.is_none())
        {
            bail!("verified token mode requires MSAL_TENANT_ID and MSAL_CLIENT_ID");
        }

        let storage = StorageConfig {
            backend: args.backend.unwrap_or(env_backend),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            account_name: args
                .account_name
                .or_else(|| lookup("AZURE_STORAGE_ACCOUNT_NAME"))
                .filter(|v| !v.is_empty()),
            account_key: lookup("AZURE_STORAGE_ACCOUNT_KEY").filter(|v| !v.is_empty()),
            container_name: args.container_name.unwrap_or(env_container),
            use_azure_cli: args.use_azure_cli || env_use_cli,
        };

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage,
            auth,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
