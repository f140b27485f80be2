//! LAN interface discovery
//!
//! Picks the first up, non-loopback IPv4 interface that supports broadcast
//! and derives its broadcast address from the netmask.

use std::ffi::CStr;
use std::net::Ipv4Addr;

/// An IPv4 interface usable for cluster broadcasts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanInterface {
    pub name: String,
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl LanInterface {
    pub fn broadcast(&self) -> Ipv4Addr {
        broadcast_address(self.address, self.netmask)
    }
}

/// Directed broadcast address: host bits all set
pub fn broadcast_address(address: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(address) | !u32::from(netmask))
}

/// Find the LAN interface, if the host has one
pub fn lan_interface() -> Option<LanInterface> {
    let interfaces = match ipv4_interfaces() {
        Ok(list) => list,
        Err(e) => {
            tracing::warn!("Failed to list network interfaces: {}", e);
            return None;
        }
    };

    interfaces
        .into_iter()
        .find(|iface| !iface.address.is_loopback() && !iface.address.is_link_local())
}

/// All up, broadcast-capable IPv4 interfaces
fn ipv4_interfaces() -> std::io::Result<Vec<LanInterface>> {
    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut head) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let mut found = Vec::new();
    let mut cursor = head;

    while !cursor.is_null() {
        // SAFETY: cursor walks the list returned by getifaddrs, freed below
        let entry = unsafe { &*cursor };
        cursor = entry.ifa_next;

        let flags = entry.ifa_flags as libc::c_int;
        let usable = flags & libc::IFF_UP != 0
            && flags & libc::IFF_BROADCAST != 0
            && flags & libc::IFF_LOOPBACK == 0;
        if !usable {
            continue;
        }

        let (Some(address), Some(netmask)) =
            (unsafe { ipv4_of(entry.ifa_addr) }, unsafe { ipv4_of(entry.ifa_netmask) })
        else {
            continue;
        };

        let name = unsafe { CStr::from_ptr(entry.ifa_name) }
            .to_string_lossy()
            .into_owned();

        found.push(LanInterface {
            name,
            address,
            netmask,
        });
    }

    unsafe { libc::freeifaddrs(head) };
    Ok(found)
}

/// Extract an IPv4 address from a sockaddr pointer
unsafe fn ipv4_of(addr: *const libc::sockaddr) -> Option<Ipv4Addr> {
    if addr.is_null() || (*addr).sa_family as libc::c_int != libc::AF_INET {
        return None;
    }
    let sin = &*(addr as *const libc::sockaddr_in);
    Some(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)))
}
