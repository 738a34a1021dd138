//! Connection string assembly
//!
//! Produces `mongodb://host:port` followed by `/?key=value&...` for the
//! options that are set. Credentials never appear in the string; they are
//! carried separately by the client.

use crate::connection::{ConnectionConfig, RetryWrites};
use crate::{Error, Result};
use std::fmt;

/// URI scheme
pub const SCHEME: &str = "mongodb";

/// Assembled connection address and options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    /// Host
    pub host: String,
    /// Port
    pub port: u16,
    /// Query options in assembly order
    pub options: Vec<(String, String)>,
}

impl ConnectionString {
    /// Assemble from a validated configuration
    ///
    /// `retrywrites` is added only when explicitly set, `ssl=true` only when
    /// TLS is requested, `replicaSet` only when non-empty.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        let mut cs = Self {
            host: config.host.clone(),
            port: config.port,
            options: Vec::new(),
        };

        match config.retry_writes {
            RetryWrites::Unset => {}
            RetryWrites::Disabled => cs.add_arg("retrywrites", "false"),
            RetryWrites::Enabled => cs.add_arg("retrywrites", "true"),
        }
        if config.ssl {
            cs.add_arg("ssl", "true");
        }
        if let Some(name) = config.replica_set.as_deref().filter(|n| !n.is_empty()) {
            cs.add_arg("replicaSet", name);
        }

        cs
    }

    fn add_arg(&mut self, key: &str, value: &str) {
        self.options.push((key.to_string(), value.to_string()));
    }

    /// Look up an option; keys compare case-insensitively
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Whether `ssl` or `tls` is set to true
    pub fn tls_requested(&self) -> bool {
        ["ssl", "tls"]
            .iter()
            .any(|k| self.option(k).is_some_and(|v| v.eq_ignore_ascii_case("true")))
    }

    /// Base address without options
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("{}://[{}]:{}", SCHEME, self.host, self.port)
        } else {
            format!("{}://{}:{}", SCHEME, self.host, self.port)
        }
    }

    /// Parse a single-host `mongodb://host[:port][/][?k=v&...]` string
    ///
    /// Credentials in the authority section are rejected.
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("mongodb://")
            .ok_or_else(|| Error::Config("connection string must start with mongodb://".into()))?;

        let (authority, query) = match rest.split_once('?') {
            Some((a, q)) => (a, q),
            None => (rest, ""),
        };
        let authority = authority.trim_end_matches('/');

        if authority.contains('@') {
            return Err(Error::Config(
                "credentials must not be embedded in the connection string".into(),
            ));
        }
        if authority.contains(',') {
            return Err(Error::Config("only a single host is supported".into()));
        }

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| Error::Config("unterminated IPv6 host".into()))?;
            (host, tail.strip_prefix(':'))
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };
        let port = match port {
            Some(port) => port
                .parse()
                .map_err(|_| Error::Config(format!("invalid port '{}'", port)))?,
            None => crate::connection::DEFAULT_PORT,
        };
        if host.is_empty() {
            return Err(Error::Config("connection string has no host".into()));
        }

        let mut options = Vec::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("malformed option '{}'", pair)))?;
            options.push((key.to_string(), value.to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            options,
        })
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())?;
        for (i, (key, value)) in self.options.iter().enumerate() {
            let sep = if i == 0 { "/?" } else { "&" };
            write!(f, "{}{}={}", sep, key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn option_set(cs: &ConnectionString) -> BTreeMap<String, String> {
        cs.options.iter().cloned().collect()
    }

    fn config() -> crate::connection::ConnectionConfigBuilder {
        ConnectionConfig::builder("db.example.com", 27017)
    }

    #[test]
    fn test_no_options() {
        let cs = ConnectionString::from_config(&config().build().unwrap());
        assert_eq!(cs.to_string(), "mongodb://db.example.com:27017");
        assert!(cs.options.is_empty());
    }

    #[test]
    fn test_all_options() {
        let cs = ConnectionString::from_config(
            &config()
                .retry_writes(RetryWrites::Disabled)
                .ssl(true)
                .replica_set("rs0")
                .build()
                .unwrap(),
        );

        let parsed = ConnectionString::parse(&cs.to_string()).unwrap();
        let expected: BTreeMap<String, String> = [
            ("retrywrites", "false"),
            ("ssl", "true"),
            ("replicaSet", "rs0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(option_set(&parsed), expected);
        assert_eq!(parsed.host, "db.example.com");
        assert_eq!(parsed.port, 27017);
        assert!(parsed.tls_requested());
    }

    #[test]
    fn test_separators() {
        let cs = ConnectionString::from_config(
            &config().ssl(true).replica_set("rs0").build().unwrap(),
        );
        let s = cs.to_string();
        assert_eq!(s.matches("/?").count(), 1);
        assert_eq!(s.matches('&').count(), 1);
    }

    #[test]
    fn test_retrywrites_tri_state() {
        let unset = ConnectionString::from_config(&config().build().unwrap());
        assert_eq!(unset.option("retrywrites"), None);

        let enabled = ConnectionString::from_config(
            &config().retry_writes(RetryWrites::Enabled).build().unwrap(),
        );
        assert_eq!(enabled.option("retryWrites"), Some("true"));

        let disabled = ConnectionString::from_config(
            &config().retry_writes(RetryWrites::Disabled).build().unwrap(),
        );
        assert_eq!(disabled.option("retrywrites"), Some("false"));
    }

    #[test]
    fn test_empty_replica_set_omitted() {
        let cs = ConnectionString::from_config(&config().replica_set("").build().unwrap());
        assert_eq!(cs.option("replicaSet"), None);
        assert!(!cs.tls_requested());
    }

    #[test]
    fn test_parse_default_port() {
        let cs = ConnectionString::parse("mongodb://localhost/?tls=true").unwrap();
        assert_eq!(cs.port, 27017);
        assert!(cs.tls_requested());
    }

    #[test]
    fn test_ipv6_host() {
        let cs = ConnectionString::parse("mongodb://[::1]:27018").unwrap();
        assert_eq!(cs.host, "::1");
        assert_eq!(cs.port, 27018);
        assert_eq!(cs.to_string(), "mongodb://[::1]:27018");
    }

    #[test]
    fn test_parse_rejects() {
        assert!(ConnectionString::parse("postgres://localhost").is_err());
        assert!(ConnectionString::parse("mongodb://user:pw@localhost").is_err());
        assert!(ConnectionString::parse("mongodb://a:1,b:2").is_err());
        assert!(ConnectionString::parse("mongodb://localhost:notaport").is_err());
        assert!(ConnectionString::parse("mongodb://localhost/?ssl").is_err());
    }
}
