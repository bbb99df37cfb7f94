//! Source-address resolution for `read_from`.
//!
//! The queue does not own address resolution; it extracts the raw peer
//! address from receive headers and hands it to an [`AddressVector`]
//! collaborator for mapping into a compact handle.

use std::net::Ipv4Addr;

/// Opaque address handle produced by the address-resolution service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Addr(pub u64);

impl Addr {
    /// Sentinel for receives whose source address could not be mapped.
    pub const NOT_AVAILABLE: Addr = Addr(u64::MAX);
}

/// Raw transport address of a peer, parsed from the encapsulation headers
/// of a received frame (IPv4 source address and UDP source port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawSrcAddr {
    /// Source IPv4 address.
    pub ip: Ipv4Addr,
    /// Source UDP port.
    pub port: u16,
}

/// Address-resolution collaborator.
///
/// `resolve_or_insert` maps a raw address to a handle, inserting it when
/// unknown. `None` means the address cannot be mapped, which `read_from`
/// reports as [`Addr::NOT_AVAILABLE`] rather than failing the whole call.
pub trait AddressVector {
    /// Look up or insert a raw address, returning its handle.
    fn resolve_or_insert(&mut self, src: RawSrcAddr) -> Option<Addr>;
}
