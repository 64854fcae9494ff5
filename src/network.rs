use std::collections::HashMap;
use std::net::Ipv4Addr;

use anyhow::{Context, Result, anyhow};
use futures::{Stream, StreamExt};
use log::debug;
use netlink_packet_route::address::{AddressAttribute, AddressMessage};
use netlink_packet_route::link::{LinkAttribute, LinkMessage};
use rtnetlink::{Error as NlError, Handle as NlHandle, new_connection};
use tokio::runtime::Handle as RtHandle;

use crate::ip::{AddressTable, HostAddress, IpResolver, first_ipv4};

pub(crate) struct NetlinkConnection {
    handle: NlHandle,
}

impl NetlinkConnection {
    pub(crate) fn new() -> Result<Self> {
        let rt = RtHandle::try_current().map_err(|_| anyhow!("tokio is not running"))?;
        let (connection, handle, _) =
            new_connection().map_err(|e| anyhow!("unable to create netlink socket: {}", e))?;
        rt.spawn(connection);
        Ok(Self { handle })
    }

    pub(crate) async fn link_names(&self) -> Result<HashMap<u32, String>> {
        let mut names = HashMap::new();
        let mut links = self.link_stream();
        while let Some(link_res) = links.next().await {
            let link = link_res.context("unable to list links")?;
            if let Some(name) = link_name(&link) {
                names.insert(link.header.index, name);
            }
        }
        Ok(names)
    }

    pub(crate) fn address_stream(&self) -> impl Stream<Item = Result<AddressMessage, NlError>> {
        self.handle.address().get().execute()
    }

    pub(crate) fn link_stream(&self) -> impl Stream<Item = Result<LinkMessage, NlError>> {
        self.handle.link().get().execute()
    }

    pub(crate) async fn addresses(&self) -> Result<Vec<HostAddress>> {
        let names = self.link_names().await?;
        let mut messages = Vec::new();
        let mut stream = self.address_stream();
        while let Some(msg_res) = stream.next().await {
            messages.push(msg_res.context("unable to list addresses")?);
        }
        Ok(collect_addresses(&names, messages))
    }
}

fn link_name(link: &LinkMessage) -> Option<String> {
    link.attributes.iter().find_map(|nla| match nla {
        LinkAttribute::IfName(n) => Some(n.clone()),
        _ => None,
    })
}

fn collect_addresses(
    names: &HashMap<u32, String>,
    messages: impl IntoIterator<Item = AddressMessage>,
) -> Vec<HostAddress> {
    let mut addresses: Vec<HostAddress> = Vec::new();
    for msg in messages {
        let Some(name) = names.get(&msg.header.index) else {
            continue;
        };
        for nla in &msg.attributes {
            if let AddressAttribute::Address(ip) = nla {
                let address = HostAddress::new(name.clone(), *ip);
                if !addresses.contains(&address) {
                    addresses.push(address);
                }
            }
        }
    }
    addresses
}

/// Address table and resolver backed by rtnetlink. Calls block on the
/// given runtime, so they must come from outside of it.
#[derive(Clone, Debug)]
pub struct NetlinkHost {
    rt: RtHandle,
}

impl NetlinkHost {
    pub fn new(rt: RtHandle) -> Self {
        Self { rt }
    }
}

impl AddressTable for NetlinkHost {
    fn addresses(&self) -> Result<Vec<HostAddress>> {
        self.rt.block_on(async {
            let nl = NetlinkConnection::new().context("failed to create netlink connection")?;
            let addresses = nl.addresses().await?;
            debug!("Host addresses: {:?}", addresses);
            Ok::<_, anyhow::Error>(addresses)
        })
    }
}

impl IpResolver for NetlinkHost {
    fn primary_ipv4(&self, interface: &str) -> Result<Ipv4Addr> {
        first_ipv4(&self.addresses()?, interface)
    }
}

#[cfg(test)]
mod test {
    use std::net::{IpAddr, Ipv6Addr};

    use pretty_assertions::assert_eq;

    use super::*;

    fn address_message(index: u32, ips: &[IpAddr]) -> AddressMessage {
        let mut msg = AddressMessage::default();
        msg.header.index = index;
        msg.attributes = ips.iter().map(|ip| AddressAttribute::Address(*ip)).collect();
        msg
    }

    #[test]
    fn test_link_name() {
        let mut link = LinkMessage::default();
        assert_eq!(None, link_name(&link));
        link.attributes.push(LinkAttribute::IfName("eth0".into()));
        assert_eq!(Some("eth0".to_string()), link_name(&link));
    }

    #[test]
    fn test_collect_addresses() {
        let names = HashMap::from([(1, "lo".to_string()), (2, "eth0".to_string())]);
        let v4 = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));
        let messages = vec![
            address_message(1, &[IpAddr::V4(Ipv4Addr::LOCALHOST)]),
            address_message(2, &[v4, v4]),
            address_message(2, &[IpAddr::V6(Ipv6Addr::LOCALHOST)]),
            address_message(7, &[IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1))]),
        ];
        assert_eq!(
            vec![
                HostAddress::new("lo", IpAddr::V4(Ipv4Addr::LOCALHOST)),
                HostAddress::new("eth0", v4),
                HostAddress::new("eth0", IpAddr::V6(Ipv6Addr::LOCALHOST)),
            ],
            collect_addresses(&names, messages)
        );
    }
}
