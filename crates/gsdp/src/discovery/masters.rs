// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configured master directory and selection.
//!
//! Masters come from up to ten preference entries of the form
//! `"<region>:<host:port>"`. Selection prefers a master in the caller's
//! region, starting from a position derived from the virtual clock so
//! repeated queries spread across the configured set; a master that times
//! out is removed from the working copy and selection runs again.

use crate::config::{PrefStore, KEY_MASTER_PREFIX, MAX_MASTERS};
use crate::core::addr::ServerAddr;
use std::net::{SocketAddr, ToSocketAddrs};

/// One configured master endpoint. Region 0 is invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterInfo {
    pub address: ServerAddr,
    pub region: u32,
}

/// Working copy of the configured master list for one query session.
#[derive(Debug, Default, Clone)]
pub struct MasterDirectory {
    masters: Vec<MasterInfo>,
}

impl MasterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the configured master lines. Malformed lines are logged and
    /// skipped; the query continues with whatever parsed.
    pub fn load_from(prefs: &PrefStore) -> Self {
        let mut masters = Vec::new();
        for i in 0..MAX_MASTERS {
            let key = format!("{}{}", KEY_MASTER_PREFIX, i);
            let Some(line) = prefs.get(&key) else {
                continue;
            };
            match parse_master_line(&line) {
                Some(info) => masters.push(info),
                None => log::warn!("[master] bad master server line {}: {}", key, line),
            }
        }
        if masters.is_empty() {
            log::info!("[master] no master servers configured");
        }
        Self { masters }
    }

    pub fn len(&self) -> usize {
        self.masters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MasterInfo> {
        self.masters.iter()
    }

    pub fn contains(&self, addr: &ServerAddr) -> bool {
        self.masters.iter().any(|m| m.address == *addr)
    }

    /// Drop a master that stopped answering.
    pub fn remove(&mut self, addr: &ServerAddr) {
        self.masters.retain(|m| m.address != *addr);
    }

    /// Pick the master to query. Starts at `now % len` and scans forward
    /// (wrapping) for a region match, settling for the starting entry when
    /// no master is in the preferred region. `None` when the list is empty.
    pub fn pick(&self, now_ms: u32, preferred_region: u32) -> Option<ServerAddr> {
        if self.masters.is_empty() {
            return None;
        }
        let start = now_ms as usize % self.masters.len();
        let mut index = start;
        for _ in 0..self.masters.len() {
            if self.masters[index].region == preferred_region {
                log::info!(
                    "[master] found master server {} in same region",
                    self.masters[index].address
                );
                return Some(self.masters[index].address);
            }
            index = (index + 1) % self.masters.len();
        }
        log::info!(
            "[master] no master servers in this region, trying {}",
            self.masters[start].address
        );
        Some(self.masters[start].address)
    }
}

fn parse_master_line(line: &str) -> Option<MasterInfo> {
    let (region_text, addr_text) = line.split_once(':')?;
    let region: u32 = region_text.trim().parse().ok()?;
    if region == 0 {
        return None;
    }
    let address = resolve_addr(addr_text.trim())?;
    Some(MasterInfo { address, region })
}

/// Numeric endpoints parse directly; hostnames go through the resolver and
/// take the first IPv4 result.
fn resolve_addr(text: &str) -> Option<ServerAddr> {
    if let Ok(addr) = text.parse::<ServerAddr>() {
        return addr.octets().map(|_| addr);
    }
    let resolved = text.to_socket_addrs().ok()?;
    for sa in resolved {
        if let SocketAddr::V4(v4) = sa {
            return Some(v4.into());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory(entries: &[(u32, [u8; 4])]) -> MasterDirectory {
        MasterDirectory {
            masters: entries
                .iter()
                .map(|(region, octets)| MasterInfo {
                    address: ServerAddr::new(*octets, 28002),
                    region: *region,
                })
                .collect(),
        }
    }

    #[test]
    fn test_load_from_prefs_skips_malformed_lines() {
        let prefs = PrefStore::new();
        prefs.set("client.master0", "2:10.0.0.1:28002");
        prefs.set("client.master1", "not-a-master");
        prefs.set("client.master2", "0:10.0.0.2:28002"); // region 0 invalid
        prefs.set("client.master3", "3:10.0.0.3:28002");
        // client.master4..9 unset

        let dir = MasterDirectory::load_from(&prefs);
        assert_eq!(dir.len(), 2);
        assert!(dir.contains(&ServerAddr::new([10, 0, 0, 1], 28002)));
        assert!(dir.contains(&ServerAddr::new([10, 0, 0, 3], 28002)));
    }

    #[test]
    fn test_pick_prefers_matching_region() {
        let dir = directory(&[(1, [10, 0, 0, 1]), (2, [10, 0, 0, 2]), (3, [10, 0, 0, 3])]);

        // Whatever the starting index, the region-2 master wins.
        for now in 0..6 {
            assert_eq!(
                dir.pick(now, 2),
                Some(ServerAddr::new([10, 0, 0, 2], 28002))
            );
        }
    }

    #[test]
    fn test_pick_settles_for_start_index_without_region_match() {
        let dir = directory(&[(1, [10, 0, 0, 1]), (1, [10, 0, 0, 2])]);

        assert_eq!(
            dir.pick(0, 9),
            Some(ServerAddr::new([10, 0, 0, 1], 28002))
        );
        assert_eq!(
            dir.pick(1, 9),
            Some(ServerAddr::new([10, 0, 0, 2], 28002))
        );
    }

    #[test]
    fn test_pick_on_empty_directory_fails() {
        let dir = MasterDirectory::new();
        assert_eq!(dir.pick(0, 1), None);
    }

    #[test]
    fn test_remove_supports_failover() {
        let mut dir = directory(&[(1, [10, 0, 0, 1]), (1, [10, 0, 0, 2])]);
        let first = dir.pick(0, 1).expect("pick");
        dir.remove(&first);
        let second = dir.pick(0, 1).expect("pick after failover");
        assert_ne!(first, second);
        dir.remove(&second);
        assert_eq!(dir.pick(0, 1), None);
    }
}
