/// CIDR validation for firewall and authorized-network ranges
use std::net::IpAddr;

use crate::error::{Result, StackError};

/// Validate `address/prefix` notation for IPv4 or IPv6
pub fn validate_cidr(cidr: &str) -> Result<()> {
    let invalid = || StackError::InvalidCidr(cidr.to_string());

    let (addr, prefix) = cidr.trim().split_once('/').ok_or_else(invalid)?;
    let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
    // Reject signs and whitespace that u8 parsing would otherwise accept
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;

    let max = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    if prefix > max {
        return Err(invalid());
    }

    Ok(())
}

/// Validate every range in a list
pub fn validate_all<S: AsRef<str>>(ranges: &[S]) -> Result<()> {
    ranges.iter().try_for_each(|r| validate_cidr(r.as_ref()))
}
