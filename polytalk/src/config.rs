use clap::ArgMatches;
use polytalk_packets::Network;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no interfaces specified")]
    NoInterfaces,
    #[error("only one interface specified")]
    OnlyOneInterface,
    #[error("invalid network number: {0}")]
    BadNetwork(String),
}

/// Everything the supervisor needs to build the bridge.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub ether: Vec<String>,
    pub multicast: Vec<String>,
    pub serial: Vec<String>,
    pub tcp_client: Vec<String>,
    pub tcp_server: Vec<String>,
    pub network: Network,
    pub debug: bool,
}

/// Default network number for LocalTalk-side nodes.
pub const DEFAULT_NETWORK: Network = 0xff00;

impl Config {
    pub fn from_matches(matches: &ArgMatches) -> Result<Config, ConfigError> {
        let list = |name: &str| -> Vec<String> {
            matches
                .values_of(name)
                .map(|vals| vals.map(String::from).collect())
                .unwrap_or_default()
        };

        let network = match matches.value_of("network") {
            Some(text) => parse_network(text)?,
            None => DEFAULT_NETWORK,
        };

        let config = Config {
            ether: list("ethertalk"),
            multicast: list("multicast"),
            serial: list("serial"),
            tcp_client: list("tcp-client"),
            tcp_server: list("tcp-server"),
            network,
            debug: matches.is_present("debug"),
        };
        config.validate()?;
        Ok(config)
    }

    /// A bridge with nothing to bridge is a configuration error. One port
    /// is only useful when a listener may add more, or when packet logging
    /// is the point.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let total = self.ether.len()
            + self.multicast.len()
            + self.serial.len()
            + self.tcp_client.len()
            + self.tcp_server.len();
        if total == 0 {
            return Err(ConfigError::NoInterfaces);
        }
        if total == 1 && self.tcp_server.is_empty() && !self.debug {
            return Err(ConfigError::OnlyOneInterface);
        }
        Ok(())
    }
}

/// Accepts decimal or 0x-prefixed hex, since network numbers are written
/// both ways in AppleTalk documentation.
fn parse_network(text: &str) -> Result<Network, ConfigError> {
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Network::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| ConfigError::BadNetwork(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            network: DEFAULT_NETWORK,
            ..Config::default()
        }
    }

    #[test]
    fn no_interfaces_is_an_error() {
        assert_eq!(base().validate().unwrap_err(), ConfigError::NoInterfaces);
    }

    #[test]
    fn one_interface_is_an_error_without_listener_or_debug() {
        let mut config = base();
        config.ether.push("eth0".into());
        assert_eq!(config.validate().unwrap_err(), ConfigError::OnlyOneInterface);
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "only one interface specified"
        );
    }

    #[test]
    fn one_interface_is_fine_with_debug() {
        let mut config = base();
        config.multicast.push("eth0".into());
        config.debug = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn a_lone_listener_is_fine() {
        let mut config = base();
        config.tcp_server.push("0.0.0.0:9999".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn two_interfaces_are_fine() {
        let mut config = base();
        config.ether.push("eth0".into());
        config.serial.push("/dev/ttyUSB0".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn network_parsing() {
        assert_eq!(parse_network("65280").unwrap(), 0xff00);
        assert_eq!(parse_network("0xff00").unwrap(), 0xff00);
        assert_eq!(parse_network("0XFF00").unwrap(), 0xff00);
        assert!(parse_network("potato").is_err());
        assert!(parse_network("65536").is_err());
    }
}
