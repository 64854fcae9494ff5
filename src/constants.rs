pub const DIR_DHCP: &str = "/etc/dhcp";
pub const DIR_IFCFG: &str = "/etc/sysconfig/network-scripts";
pub const DIR_SYS_CLASS_NET: &str = "/sys/class/net";

pub const FILE_DHCLIENT_CONF: &str = "/etc/dhcp/dhclient.conf";
pub const FILE_ETC_RESOLV_CONF: &str = "/etc/resolv.conf";
pub const FILE_HOSTNET_CONFIG: &str = "/etc/hostnet/config.yaml";

pub const EXE_ARPING: &str = "arping";

pub const PREFIX_IFCFG: &str = "ifcfg-";
pub const PREFIX_DHCLIENT: &str = "dhclient-";
