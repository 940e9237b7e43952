//! Kernel routing table collaborator.
//!
//! The RIB engine never talks to the kernel directly; the driver hands
//! copied-out entries across this trait. On Linux the implementation
//! speaks rtnetlink; elsewhere, and in tests, an in-memory table
//! stands in.

use crate::error::Result;
use crate::types::{RouteEntry, RoutePrefix};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Install/replace/delete/dump interface to the host routing table.
#[async_trait]
pub trait KernelRouteSync: Send + Sync {
    /// Programs a newly-learned route.
    async fn install(&self, entry: &RouteEntry) -> Result<()>;

    /// Overwrites the existing route for the entry's prefix.
    async fn replace(&self, entry: &RouteEntry) -> Result<()>;

    /// Removes the route for the entry's prefix.
    async fn delete(&self, entry: &RouteEntry) -> Result<()>;

    /// Dumps the prefixes of the host's own interface routes, for the
    /// local-route reconciler.
    async fn dump_local_routes(&self) -> Result<Vec<RoutePrefix>>;
}

/// A kernel operation observed by [`MemoryKernel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelOp {
    Install(RoutePrefix),
    Replace(RoutePrefix),
    Delete(RoutePrefix),
}

/// In-memory kernel table.
///
/// Used on non-Linux hosts and throughout the tests; records every
/// operation so tests can assert on the syscall sequence.
#[derive(Debug, Default)]
pub struct MemoryKernel {
    routes: Mutex<HashMap<RoutePrefix, RouteEntry>>,
    local_routes: Mutex<Vec<RoutePrefix>>,
    ops: Mutex<Vec<KernelOp>>,
}

impl MemoryKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets what the next `dump_local_routes` call returns.
    pub fn set_local_routes(&self, prefixes: Vec<RoutePrefix>) {
        *self.local_routes.lock() = prefixes;
    }

    /// Operations applied so far, in order.
    pub fn ops(&self) -> Vec<KernelOp> {
        self.ops.lock().clone()
    }

    /// The currently-programmed route for a prefix, if any.
    pub fn route(&self, prefix: &RoutePrefix) -> Option<RouteEntry> {
        self.routes.lock().get(prefix).cloned()
    }

    pub fn route_count(&self) -> usize {
        self.routes.lock().len()
    }
}

#[async_trait]
impl KernelRouteSync for MemoryKernel {
    async fn install(&self, entry: &RouteEntry) -> Result<()> {
        self.routes.lock().insert(entry.prefix, entry.clone());
        self.ops.lock().push(KernelOp::Install(entry.prefix));
        Ok(())
    }

    async fn replace(&self, entry: &RouteEntry) -> Result<()> {
        self.routes.lock().insert(entry.prefix, entry.clone());
        self.ops.lock().push(KernelOp::Replace(entry.prefix));
        Ok(())
    }

    async fn delete(&self, entry: &RouteEntry) -> Result<()> {
        self.routes.lock().remove(&entry.prefix);
        self.ops.lock().push(KernelOp::Delete(entry.prefix));
        Ok(())
    }

    async fn dump_local_routes(&self) -> Result<Vec<RoutePrefix>> {
        Ok(self.local_routes.lock().clone())
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use super::KernelRouteSync;
    use crate::error::{Result, RibdError};
    use crate::types::{RouteEntry, RoutePrefix};
    use async_trait::async_trait;
    use netlink_packet_core::{
        NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_CREATE, NLM_F_DUMP, NLM_F_REPLACE,
        NLM_F_REQUEST,
    };
    use netlink_packet_route::route::{
        RouteAddress, RouteAttribute, RouteHeader, RouteMessage, RouteProtocol, RouteScope,
        RouteType,
    };
    use netlink_packet_route::{AddressFamily, RouteNetlinkMessage};
    use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
    use parking_lot::Mutex;
    use std::ffi::CString;
    use std::net::Ipv4Addr;
    use tracing::{debug, warn};

    /// Receive buffer size for dump responses.
    const RECV_BUFFER_SIZE: usize = 64 * 1024;

    struct RouteSocket {
        socket: Socket,
        buffer: Vec<u8>,
    }

    /// rtnetlink-backed kernel route table access.
    pub struct NetlinkRouteSync {
        inner: Mutex<RouteSocket>,
        ifindex: u32,
    }

    impl NetlinkRouteSync {
        /// Opens an `NETLINK_ROUTE` socket and resolves the interface
        /// routes are installed through.
        pub fn new(iface: &str) -> Result<Self> {
            let mut socket = Socket::new(NETLINK_ROUTE)
                .map_err(|e| RibdError::Netlink(format!("failed to create socket: {e}")))?;
            socket
                .bind_auto()
                .map_err(|e| RibdError::Netlink(format!("failed to bind socket: {e}")))?;
            socket
                .connect(&SocketAddr::new(0, 0))
                .map_err(|e| RibdError::Netlink(format!("failed to connect socket: {e}")))?;

            let ifindex = resolve_ifindex(iface)?;
            debug!(iface, ifindex, "netlink route socket opened");

            Ok(Self {
                inner: Mutex::new(RouteSocket {
                    socket,
                    buffer: Vec::with_capacity(RECV_BUFFER_SIZE),
                }),
                ifindex,
            })
        }

        fn send_route(&self, msg: RouteNetlinkMessage, flags: u16) -> Result<()> {
            let mut header = NetlinkHeader::default();
            header.flags = flags;

            let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(msg));
            packet.finalize();

            let mut buf = vec![0u8; packet.buffer_len()];
            packet.serialize(&mut buf);

            let inner = self.inner.lock();
            inner
                .socket
                .send(&buf, 0)
                .map_err(|e| RibdError::Netlink(format!("failed to send request: {e}")))?;
            Ok(())
        }

        fn route_message(&self, entry: &RouteEntry) -> RouteMessage {
            let mut msg = RouteMessage::default();
            msg.header.address_family = AddressFamily::Inet;
            msg.header.destination_prefix_length = entry.prefix.prefix_len();
            msg.header.table = RouteHeader::RT_TABLE_MAIN;
            msg.header.protocol = RouteProtocol::Static;
            msg.header.scope = RouteScope::Universe;
            msg.header.kind = RouteType::Unicast;
            msg.attributes
                .push(RouteAttribute::Destination(RouteAddress::Inet(
                    entry.prefix.addr,
                )));
            if entry.next_hop != Ipv4Addr::UNSPECIFIED {
                msg.attributes
                    .push(RouteAttribute::Gateway(RouteAddress::Inet(entry.next_hop)));
            }
            msg.attributes.push(RouteAttribute::Oif(self.ifindex));
            msg
        }
    }

    #[async_trait]
    impl KernelRouteSync for NetlinkRouteSync {
        async fn install(&self, entry: &RouteEntry) -> Result<()> {
            debug!(route = %entry, "installing kernel route");
            self.send_route(
                RouteNetlinkMessage::NewRoute(self.route_message(entry)),
                NLM_F_REQUEST | NLM_F_CREATE,
            )
        }

        async fn replace(&self, entry: &RouteEntry) -> Result<()> {
            debug!(route = %entry, "replacing kernel route");
            self.send_route(
                RouteNetlinkMessage::NewRoute(self.route_message(entry)),
                NLM_F_REQUEST | NLM_F_CREATE | NLM_F_REPLACE,
            )
        }

        async fn delete(&self, entry: &RouteEntry) -> Result<()> {
            debug!(route = %entry, "deleting kernel route");
            self.send_route(
                RouteNetlinkMessage::DelRoute(self.route_message(entry)),
                NLM_F_REQUEST,
            )
        }

        async fn dump_local_routes(&self) -> Result<Vec<RoutePrefix>> {
            let mut header = NetlinkHeader::default();
            header.flags = NLM_F_REQUEST | NLM_F_DUMP;

            let mut dump_msg = RouteMessage::default();
            dump_msg.header.address_family = AddressFamily::Inet;
            let mut packet = NetlinkMessage::new(
                header,
                NetlinkPayload::InnerMessage(RouteNetlinkMessage::GetRoute(dump_msg)),
            );
            packet.finalize();
            let mut buf = vec![0u8; packet.buffer_len()];
            packet.serialize(&mut buf);

            let mut inner = self.inner.lock();
            let RouteSocket { socket, buffer } = &mut *inner;
            socket
                .send(&buf, 0)
                .map_err(|e| RibdError::Netlink(format!("failed to send dump request: {e}")))?;

            let mut prefixes = Vec::new();
            let mut done = false;
            while !done {
                buffer.clear();
                let len = socket
                    .recv(buffer, 0)
                    .map_err(|e| RibdError::Netlink(format!("failed to receive dump: {e}")))?;

                let mut offset = 0;
                while offset < len {
                    let msg =
                        NetlinkMessage::<RouteNetlinkMessage>::deserialize(&buffer[offset..len])
                            .map_err(|e| {
                                RibdError::Netlink(format!("failed to parse message: {e}"))
                            })?;

                    offset += msg.header.length as usize;
                    // Netlink messages are 4-byte aligned.
                    offset = (offset + 3) & !3;

                    match msg.payload {
                        NetlinkPayload::Done(_) => {
                            done = true;
                            break;
                        }
                        NetlinkPayload::Error(e) => {
                            return Err(RibdError::Netlink(format!("dump failed: {e:?}")));
                        }
                        NetlinkPayload::InnerMessage(RouteNetlinkMessage::NewRoute(route)) => {
                            if let Some(prefix) = local_prefix(&route) {
                                prefixes.push(prefix);
                            }
                        }
                        _ => {}
                    }
                }
            }

            debug!(count = prefixes.len(), "dumped local kernel routes");
            Ok(prefixes)
        }
    }

    /// Extracts the prefix of a kernel-originated main-table IPv4
    /// route; anything else (cloned caches, our own static installs,
    /// other tables) is skipped.
    fn local_prefix(route: &RouteMessage) -> Option<RoutePrefix> {
        if route.header.address_family != AddressFamily::Inet
            || route.header.table != RouteHeader::RT_TABLE_MAIN
            || route.header.protocol != RouteProtocol::Kernel
        {
            return None;
        }

        for attr in &route.attributes {
            if let RouteAttribute::Destination(RouteAddress::Inet(addr)) = attr {
                let mask = mask_from_len(route.header.destination_prefix_length);
                return Some(RoutePrefix::new(*addr, mask.into()));
            }
        }
        None
    }

    fn mask_from_len(len: u8) -> u32 {
        if len == 0 {
            0
        } else if len >= 32 {
            u32::MAX
        } else {
            u32::MAX << (32 - len)
        }
    }

    fn resolve_ifindex(iface: &str) -> Result<u32> {
        let name = CString::new(iface)
            .map_err(|_| RibdError::Netlink(format!("invalid interface name: {iface}")))?;
        let ifindex = unsafe { libc::if_nametoindex(name.as_ptr()) };
        if ifindex == 0 {
            warn!(iface, "interface not found");
            return Err(RibdError::Netlink(format!("no such interface: {iface}")));
        }
        Ok(ifindex)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_mask_from_len() {
            assert_eq!(mask_from_len(0), 0);
            assert_eq!(mask_from_len(8), 0xff00_0000);
            assert_eq!(mask_from_len(24), 0xffff_ff00);
            assert_eq!(mask_from_len(32), u32::MAX);
        }
    }
}

#[cfg(target_os = "linux")]
pub use linux::NetlinkRouteSync;
