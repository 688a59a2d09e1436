use log::{error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::config::settings::AuthConfig;
use crate::error::ResolverError;

/// Shared secret bytes of one issuer. `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuerSecret(Arc<[u8]>);

impl IssuerSecret {
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        Self(Arc::from(bytes.as_ref()))
    }

    pub fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for IssuerSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IssuerSecret(<redacted, {} bytes>)", self.0.len())
    }
}

/// Maps an issuer name to the secret its tokens are signed with.
///
/// `Ok(None)` means the issuer is unknown; `Err` means the backing store
/// could not be consulted at all.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, issuer: &str) -> Result<Option<IssuerSecret>, ResolverError>;
}

type SecretMap = HashMap<String, IssuerSecret>;

/// In-memory resolver over administrator-provisioned secrets.
///
/// The whole map is replaced on reload, so concurrent readers observe either
/// the old or the new set of bindings.
pub struct StaticSecretResolver {
    secrets: RwLock<Arc<SecretMap>>,
}

impl StaticSecretResolver {
    pub fn new(secrets: SecretMap) -> Self {
        Self {
            secrets: RwLock::new(Arc::new(secrets)),
        }
    }

    /// Build from `issuer -> secret` string pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ResolverError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<[u8]>,
    {
        let mut secrets = SecretMap::new();
        for (issuer, secret) in pairs {
            insert_binding(&mut secrets, issuer.into(), secret.as_ref())?;
        }
        Ok(Self::new(secrets))
    }

    pub fn from_settings(config: &AuthConfig) -> Result<Self, ResolverError> {
        let secrets = load_sources(
            config.secrets_file.as_deref().map(Path::new),
            config.inline_secrets.as_deref(),
        )?;
        Ok(Self::new(secrets))
    }

    fn snapshot(&self) -> Arc<SecretMap> {
        let guard = self.secrets.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Sorted issuer names, safe to log.
    pub fn issuers(&self) -> Vec<String> {
        let mut issuers: Vec<String> = self.snapshot().keys().cloned().collect();
        issuers.sort();
        issuers
    }

    /// Atomically replace every binding.
    pub fn reload(&self, secrets: SecretMap) {
        let count = secrets.len();
        let mut guard = self.secrets.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(secrets);
        info!("Issuer secrets reloaded ({} issuers)", count);
    }

    /// Re-read the configured sources. On failure the previous bindings stay in place.
    pub fn reload_from_sources(&self, file: Option<&Path>, inline: Option<&str>) -> Result<(), ResolverError> {
        let secrets = load_sources(file, inline)?;
        self.reload(secrets);
        Ok(())
    }

    /// Start background reload task for the secrets file.
    pub fn start_reload_task(
        self: &Arc<Self>,
        file: PathBuf,
        inline: Option<String>,
        interval: std::time::Duration,
    ) -> tokio::task::JoinHandle<()> {
        let resolver = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            // The first tick fires immediately and the map was just loaded
            interval_timer.tick().await;
            info!("Starting issuer secret reload task (interval: {}s)", interval.as_secs());
            loop {
                interval_timer.tick().await;
                if let Err(e) = resolver.reload_from_sources(Some(&file), inline.as_deref()) {
                    error!("Issuer secret reload failed, keeping previous secrets: {}", e);
                }
            }
        })
    }
}

impl SecretResolver for StaticSecretResolver {
    fn resolve(&self, issuer: &str) -> Result<Option<IssuerSecret>, ResolverError> {
        Ok(self.snapshot().get(issuer).cloned())
    }
}

// Issuers are matched byte for byte against `iss`, so stored names carry no padding
fn insert_binding(secrets: &mut SecretMap, issuer: String, secret: &[u8]) -> Result<(), ResolverError> {
    if issuer.trim().is_empty() {
        return Err(ResolverError::Invalid("issuer name must not be empty".to_string()));
    }
    if issuer.trim() != issuer {
        return Err(ResolverError::Invalid(format!(
            "issuer name '{}' has leading or trailing whitespace",
            issuer
        )));
    }
    if secret.is_empty() {
        return Err(ResolverError::Invalid(format!("secret for issuer '{}' is empty", issuer)));
    }
    if secrets.contains_key(&issuer) {
        return Err(ResolverError::Invalid(format!(
            "issuer '{}' is configured more than once",
            issuer
        )));
    }
    secrets.insert(issuer, IssuerSecret::new(secret));
    Ok(())
}

/// Parse `issuer=secret,issuer2=secret2`. Spaces around names and secrets are
/// list formatting and are dropped.
pub fn parse_inline_secrets(spec: &str) -> Result<SecretMap, ResolverError> {
    let mut secrets = SecretMap::new();
    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (issuer, secret) = entry.split_once('=').ok_or_else(|| {
            ResolverError::Invalid("inline secrets must be 'issuer=secret' pairs".to_string())
        })?;
        insert_binding(&mut secrets, issuer.trim().to_string(), secret.trim().as_bytes())?;
    }
    Ok(secrets)
}

/// Parse a JSON object mapping issuer names to secret strings.
pub fn parse_secrets_json(contents: &str) -> Result<SecretMap, ResolverError> {
    let raw: HashMap<String, String> = serde_json::from_str(contents)
        .map_err(|e| ResolverError::Invalid(format!("secrets file is not a JSON object of strings: {}", e)))?;
    let mut secrets = SecretMap::new();
    for (issuer, secret) in raw {
        insert_binding(&mut secrets, issuer, secret.as_bytes())?;
    }
    Ok(secrets)
}

/// Read a secrets file, refusing files other users can read.
pub fn read_secrets_file(path: &Path) -> Result<SecretMap, ResolverError> {
    let io_error = |source| ResolverError::Io {
        path: path.display().to_string(),
        source,
    };

    let metadata = std::fs::metadata(path).map_err(io_error)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(ResolverError::Invalid(format!(
                "secrets file {} has insecure permissions {:04o}, expected 0600 or 0400",
                path.display(),
                mode & 0o777
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = metadata;

    let contents = std::fs::read_to_string(path).map_err(io_error)?;
    parse_secrets_json(&contents)
}

/// Merge the file and inline sources. An issuer may appear in only one of them.
pub fn load_sources(file: Option<&Path>, inline: Option<&str>) -> Result<SecretMap, ResolverError> {
    let mut secrets = match file {
        Some(path) => read_secrets_file(path)?,
        None => SecretMap::new(),
    };

    if let Some(spec) = inline {
        for (issuer, secret) in parse_inline_secrets(spec)? {
            insert_binding(&mut secrets, issuer, secret.expose())?;
        }
    }

    if secrets.is_empty() {
        warn!("No issuer secrets configured, every token will be rejected");
    }
    Ok(secrets)
}
