// Fail-fast configuration validation, run before any connection attempt.

use super::{AuthConfig, ExporterConfig, JetStreamConfig, ReceiverConfig, SignalConfig};
use crate::config::DEFAULT_ENCODING;
use crate::error::ConfigError;
use crate::nats::subject;
use crate::signal::Signal;
use url::Url;

const ACCEPTED_SCHEMES: [&str; 3] = ["nats", "tls", "nats+tls"];

/// Validates a broker URL (or a comma-separated list of them).
pub fn validate_url(raw: &str) -> Result<(), ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::MissingUrl);
    }
    for part in raw.split(',') {
        let part = part.trim();
        let parsed = Url::parse(part).map_err(|e| ConfigError::InvalidUrl {
            url: part.to_string(),
            reason: e.to_string(),
        })?;
        if !ACCEPTED_SCHEMES.contains(&parsed.scheme()) {
            return Err(ConfigError::UnsupportedScheme(parsed.scheme().to_string()));
        }
        if parsed.host_str().is_none() {
            return Err(ConfigError::InvalidUrl {
                url: part.to_string(),
                reason: "missing host".to_string(),
            });
        }
    }
    Ok(())
}

impl AuthConfig {
    /// At most one authentication method may be configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let configured = [
            self.user_info.is_some(),
            self.token.as_deref().is_some_and(|t| !t.is_empty()),
            self.nkey_file.as_deref().is_some_and(|p| !p.is_empty()),
            self.credentials_file
                .as_deref()
                .is_some_and(|p| !p.is_empty()),
        ]
        .iter()
        .filter(|set| **set)
        .count();

        if configured > 1 {
            return Err(ConfigError::AmbiguousAuth);
        }
        Ok(())
    }
}

impl JetStreamConfig {
    fn validate(&self, signal: Signal) -> Result<(), ConfigError> {
        if self.stream.is_empty() {
            return Err(ConfigError::MissingStream { signal });
        }
        if self.rate_limit > 0 && self.rate_burst == 0 {
            return Err(ConfigError::MissingRateBurst { signal });
        }
        Ok(())
    }
}

fn validate_encoding(signal: Signal, cfg: &SignalConfig) -> Result<(), ConfigError> {
    if !cfg.encoding.is_empty() && cfg.encoding != DEFAULT_ENCODING {
        return Err(ConfigError::UnsupportedEncoding {
            signal,
            supported: DEFAULT_ENCODING,
            value: cfg.encoding.clone(),
        });
    }
    Ok(())
}

impl ReceiverConfig {
    /// Validates the full receiver configuration.
    ///
    /// Subscribe-side subjects are checked against the subject character
    /// set; wildcard forms are accepted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.client.url)?;
        self.client.auth.validate()?;

        if Signal::ALL.iter().all(|s| !self.signal(*s).enabled()) {
            return Err(ConfigError::NoSignalSubject);
        }

        for signal in Signal::ALL {
            let cfg = self.signal(signal);
            validate_encoding(signal, cfg)?;
            if cfg.enabled() {
                if !subject::is_valid_subject(&cfg.subject) {
                    return Err(ConfigError::InvalidSubject {
                        signal,
                        subject: cfg.subject.clone(),
                    });
                }
                if let Some(js) = &cfg.jetstream {
                    js.validate(signal)?;
                }
            }
        }
        Ok(())
    }
}

impl ExporterConfig {
    /// Validates the full exporter configuration.
    ///
    /// Publish-side subjects are templates; the wildcard check runs
    /// against the resolved subject at publish time, since placeholders
    /// are only substituted per batch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url(&self.client.url)?;
        self.client.auth.validate()?;

        if Signal::ALL.iter().all(|s| !self.signal(*s).enabled()) {
            return Err(ConfigError::NoSignalSubject);
        }

        for signal in Signal::ALL {
            validate_encoding(signal, self.signal(signal))?;
        }
        Ok(())
    }
}
