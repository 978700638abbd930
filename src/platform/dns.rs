// Configured DNS resolvers

use std::net::IpAddr;

/// DNS servers the system resolver uses, in preference order.
pub fn dns_servers() -> Vec<IpAddr> {
    let servers = platform_dns_servers();
    log::debug!("Detected {} DNS servers", servers.len());
    servers
}

#[cfg(unix)]
fn platform_dns_servers() -> Vec<IpAddr> {
    std::fs::read_to_string("/etc/resolv.conf")
        .map(|content| parse_resolv_conf(&content))
        .unwrap_or_default()
}

#[cfg(windows)]
fn platform_dns_servers() -> Vec<IpAddr> {
    use std::process::Command;

    match Command::new("ipconfig").arg("/all").output() {
        Ok(output) => parse_ipconfig_dns(&String::from_utf8_lossy(&output.stdout)),
        Err(e) => {
            log::debug!("ipconfig failed: {}", e);
            Vec::new()
        }
    }
}

#[cfg(not(any(unix, windows)))]
fn platform_dns_servers() -> Vec<IpAddr> {
    Vec::new()
}

/// `nameserver` lines of a resolv.conf
pub fn parse_resolv_conf(content: &str) -> Vec<IpAddr> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match fields.next() {
                Some("nameserver") => fields.next()?.parse().ok(),
                _ => None,
            }
        })
        .collect()
}

/// DNS server block of `ipconfig /all`.
///
/// The first server shares the labelled line; the rest follow as bare
/// addresses until the next labelled line. Localized labels are matched on
/// "DNS" alone.
pub fn parse_ipconfig_dns(output: &str) -> Vec<IpAddr> {
    let mut servers = Vec::new();
    let mut in_block = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some((label, value)) = trimmed.split_once(" : ") {
            in_block = label.contains("DNS") && !label.contains("Suffix");
            if in_block {
                if let Ok(ip) = value.trim().parse::<IpAddr>() {
                    push_unique(&mut servers, ip);
                }
            }
        } else if in_block {
            match trimmed.parse::<IpAddr>() {
                Ok(ip) => push_unique(&mut servers, ip),
                Err(_) => in_block = false,
            }
        }
    }
    servers
}

fn push_unique(servers: &mut Vec<IpAddr>, ip: IpAddr) {
    if !servers.contains(&ip) {
        servers.push(ip);
    }
}
