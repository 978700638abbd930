// Default gateway discovery

use std::net::Ipv4Addr;

/// Default IPv4 gateway of this machine, if one can be determined.
pub fn detect_default_gateway() -> Option<Ipv4Addr> {
    let gateway = detect_platform_gateway();
    match gateway {
        Some(gw) => log::debug!("Detected default gateway {}", gw),
        None => log::debug!("No default gateway detected"),
    }
    gateway
}

#[cfg(target_os = "linux")]
fn detect_platform_gateway() -> Option<Ipv4Addr> {
    let content = std::fs::read_to_string("/proc/net/route").ok()?;
    parse_proc_net_route(&content)
}

#[cfg(windows)]
fn detect_platform_gateway() -> Option<Ipv4Addr> {
    use std::process::Command;

    let output = Command::new("powershell")
        .args([
            "-NoProfile",
            "-Command",
            "Get-NetRoute -DestinationPrefix '0.0.0.0/0' -ErrorAction SilentlyContinue | Sort-Object RouteMetric | Select-Object -First 1 -ExpandProperty NextHop",
        ])
        .output()
        .ok()?;

    let gateway = String::from_utf8_lossy(&output.stdout).trim().to_string();
    gateway
        .parse::<Ipv4Addr>()
        .ok()
        .filter(|gw| !gw.is_unspecified())
}

#[cfg(target_os = "macos")]
fn detect_platform_gateway() -> Option<Ipv4Addr> {
    use std::process::Command;

    let output = Command::new("route")
        .args(["-n", "get", "default"])
        .output()
        .ok()?;
    parse_route_get(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
fn detect_platform_gateway() -> Option<Ipv4Addr> {
    None
}

/// Parse the kernel routing table (`/proc/net/route`).
///
/// Addresses are little-endian hex; the default route has destination 0
/// and the RTF_GATEWAY flag set.
pub fn parse_proc_net_route(content: &str) -> Option<Ipv4Addr> {
    const RTF_UP: u32 = 0x1;
    const RTF_GATEWAY: u32 = 0x2;

    content.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return None;
        }
        let destination = u32::from_str_radix(fields[1], 16).ok()?;
        let gateway = u32::from_str_radix(fields[2], 16).ok()?;
        let flags = u32::from_str_radix(fields[3], 16).ok()?;

        if destination != 0 || flags & (RTF_UP | RTF_GATEWAY) != (RTF_UP | RTF_GATEWAY) {
            return None;
        }
        Some(Ipv4Addr::from(gateway.to_le_bytes()))
    })
}

/// Parse `route -n get default` output
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub fn parse_route_get(output: &str) -> Option<Ipv4Addr> {
    output.lines().find_map(|line| {
        let (key, value) = line.trim().split_once(':')?;
        if key.trim() == "gateway" {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}
