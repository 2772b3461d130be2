//! `depends` special property (C6): a comma-separated list of jail
//! ids that must already be running before this jail starts.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Depends(pub Vec<String>);

impl FromStr for Depends {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s == "none" {
            return Ok(Depends::default());
        }
        Ok(Depends(s.split(',').map(|s| s.to_string()).collect()))
    }
}

impl fmt::Display for Depends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0.join(","))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips() {
        let d: Depends = "web1,db1".parse().unwrap();
        assert_eq!(d.0, vec!["web1".to_string(), "db1".to_string()]);
        assert_eq!(d.to_string(), "web1,db1");
    }

    #[test]
    fn empty_is_none() {
        let d: Depends = "none".parse().unwrap();
        assert_eq!(d.to_string(), "none");
    }
}
