// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! IPv4 address range sets.

use super::RangeParseError;
use std::net::Ipv4Addr;

/// An inclusive IPv4 address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    lower: u32,
    upper: u32,
}

impl AddressRange {
    /// Create an address range. Bounds are reordered if swapped.
    pub fn new(lower: Ipv4Addr, upper: Ipv4Addr) -> Self {
        let (lo, hi) = (u32::from(lower), u32::from(upper));
        Self {
            lower: lo.min(hi),
            upper: lo.max(hi),
        }
    }

    /// Create a single-address range.
    pub fn single(address: Ipv4Addr) -> Self {
        Self::new(address, address)
    }

    /// Create the host range of the subnet containing `address`.
    ///
    /// Network and broadcast addresses are excluded for prefixes shorter
    /// than /31.
    pub fn from_subnet(address: Ipv4Addr, prefix: u32) -> Self {
        let prefix = prefix.min(32);
        let mask = if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - prefix)
        };
        let network = u32::from(address) & mask;
        let broadcast = network | !mask;
        if prefix >= 31 {
            Self {
                lower: network,
                upper: broadcast,
            }
        } else {
            Self {
                lower: network + 1,
                upper: broadcast - 1,
            }
        }
    }

    /// Number of addresses in the range.
    pub fn count(&self) -> usize {
        (self.upper - self.lower) as usize + 1
    }

    /// Tests whether the range contains an address.
    pub fn contains(&self, address: Ipv4Addr) -> bool {
        let value = u32::from(address);
        value >= self.lower && value <= self.upper
    }

    /// Whether this range overlaps or abuts another.
    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.lower <= other.upper && other.lower <= self.upper
    }

    /// Iterate over the addresses in the range.
    pub fn iter(&self) -> AddressIter {
        AddressIter {
            next: self.lower as u64,
            upper: self.upper as u64,
        }
    }

    /// Parse a series of address ranges. Overlapping entries are merged.
    ///
    /// Accepted entry forms: `a.b.c.d/n` (subnet hosts), `a.b.c.d-e.f.g.h`
    /// and `a.b.c.d`, comma or semicolon separated.
    pub fn parse(value: &str) -> Result<Vec<AddressRange>, RangeParseError> {
        let mut ranges = Vec::new();
        for token in value
            .split([';', ','])
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            ranges.push(Self::parse_one(token)?);
        }
        Ok(Self::merge(ranges))
    }

    /// Parse a series of address ranges, or None on malformed input.
    pub fn try_parse(value: &str) -> Option<Vec<AddressRange>> {
        Self::parse(value).ok().filter(|r| !r.is_empty())
    }

    fn parse_one(token: &str) -> Result<AddressRange, RangeParseError> {
        let err = || RangeParseError(token.to_string());
        if let Some((addr, prefix)) = token.split_once('/') {
            let addr: Ipv4Addr = addr.trim().parse().map_err(|_| err())?;
            let prefix: u32 = prefix.trim().parse().map_err(|_| err())?;
            if prefix > 32 {
                return Err(err());
            }
            return Ok(Self::from_subnet(addr, prefix));
        }
        if let Some((lo, hi)) = token.split_once('-') {
            let lo: Ipv4Addr = lo.trim().parse().map_err(|_| err())?;
            let hi: Ipv4Addr = hi.trim().parse().map_err(|_| err())?;
            if u32::from(lo) > u32::from(hi) {
                return Err(err());
            }
            return Ok(Self::new(lo, hi));
        }
        let addr: Ipv4Addr = token.parse().map_err(|_| err())?;
        Ok(Self::single(addr))
    }

    /// Total address count across a set of ranges.
    pub fn total(ranges: &[AddressRange]) -> usize {
        ranges.iter().map(AddressRange::count).sum()
    }

    /// Merge overlapping ranges into a sorted disjoint set.
    pub fn merge(mut ranges: Vec<AddressRange>) -> Vec<AddressRange> {
        ranges.sort_by_key(|r| r.lower);
        let mut merged: Vec<AddressRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(top) if top.overlaps(&range) => {
                    top.lower = top.lower.min(range.lower);
                    top.upper = top.upper.max(range.upper);
                }
                _ => merged.push(range),
            }
        }
        merged
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.lower == self.upper {
            return write!(f, "{}", Ipv4Addr::from(self.lower));
        }
        write!(
            f,
            "{}-{}",
            Ipv4Addr::from(self.lower),
            Ipv4Addr::from(self.upper)
        )
    }
}

/// Iterator over the addresses of a range.
pub struct AddressIter {
    next: u64,
    upper: u64,
}

impl Iterator for AddressIter {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        if self.next > self.upper {
            return None;
        }
        let address = Ipv4Addr::from(self.next as u32);
        self.next += 1;
        Some(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single() {
        let ranges = AddressRange::parse("192.168.1.5").unwrap();
        assert_eq!(
            ranges,
            vec![AddressRange::single(Ipv4Addr::new(192, 168, 1, 5))]
        );
    }

    #[test]
    fn test_parse_cidr_excludes_network_and_broadcast() {
        let ranges = AddressRange::parse("10.0.0.0/24").unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].count(), 254);
        assert!(!ranges[0].contains(Ipv4Addr::new(10, 0, 0, 0)));
        assert!(ranges[0].contains(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(ranges[0].contains(Ipv4Addr::new(10, 0, 0, 254)));
        assert!(!ranges[0].contains(Ipv4Addr::new(10, 0, 0, 255)));
    }

    #[test]
    fn test_parse_slash_31_keeps_both_hosts() {
        let ranges = AddressRange::parse("10.0.0.0/31").unwrap();
        assert_eq!(ranges[0].count(), 2);
    }

    #[test]
    fn test_parse_dashed() {
        let ranges = AddressRange::parse("10.0.0.10-10.0.0.20").unwrap();
        assert_eq!(ranges[0].count(), 11);
    }

    #[test]
    fn test_parse_list_merges() {
        let ranges = AddressRange::parse("10.0.0.1-10.0.0.10,10.0.0.5-10.0.0.20").unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].count(), 20);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(AddressRange::parse("10.0.0.300").is_err());
        assert!(AddressRange::parse("10.0.0.0/33").is_err());
        assert!(AddressRange::parse("10.0.0.9-10.0.0.1").is_err());
        assert!(AddressRange::try_parse("not-a-range").is_none());
    }

    #[test]
    fn test_iter() {
        let range = AddressRange::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 3));
        let addrs: Vec<Ipv4Addr> = range.iter().collect();
        assert_eq!(
            addrs,
            vec![
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 3),
            ]
        );
    }

    #[test]
    fn test_iter_at_address_space_end() {
        let range = AddressRange::new(
            Ipv4Addr::new(255, 255, 255, 254),
            Ipv4Addr::new(255, 255, 255, 255),
        );
        assert_eq!(range.iter().count(), 2);
    }

    #[test]
    fn test_display() {
        let ranges = AddressRange::parse("10.0.0.10-10.0.0.20;192.168.0.1").unwrap();
        assert_eq!(ranges[0].to_string(), "10.0.0.10-10.0.0.20");
        assert_eq!(ranges[1].to_string(), "192.168.0.1");
    }

    #[test]
    fn test_same_input_resolves_equal() {
        let a = AddressRange::parse("10.0.0.0/24,192.168.1.0/28").unwrap();
        let b = AddressRange::parse("10.0.0.0/24,192.168.1.0/28").unwrap();
        assert_eq!(a, b);
    }
}
