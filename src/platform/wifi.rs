// Wireless link quality

use once_cell::sync::Lazy;
use regex::Regex;

// "Signal : 87%" and localized variants of netsh output
static NETSH_SIGNAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:signal|señal|sinal|signalqualität|シグナル)\s*:\s*(\d{1,3})\s*%")
        .expect("valid netsh regex")
});

/// Parse `/proc/net/wireless`: link quality of the first wireless
/// interface, scaled from the driver's 0..70 range to a percentage.
pub fn parse_proc_net_wireless(content: &str) -> Option<f64> {
    content.lines().skip(2).find_map(|line| {
        let (_iface, rest) = line.split_once(':')?;
        let mut fields = rest.split_whitespace();
        let _status = fields.next()?;
        let link: f64 = fields.next()?.trim_end_matches('.').parse().ok()?;
        Some((link / 70.0 * 100.0).clamp(0.0, 100.0).round())
    })
}

/// Parse `netsh wlan show interfaces` output
pub fn parse_netsh_signal(output: &str) -> Option<f64> {
    NETSH_SIGNAL
        .captures(output)
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|v| v.clamp(0.0, 100.0))
}

/// Current Wi-Fi signal in percent; `Ok(None)` when there is no wireless link.
#[cfg(target_os = "linux")]
pub async fn wifi_signal_percent() -> std::io::Result<Option<f64>> {
    match std::fs::read_to_string("/proc/net/wireless") {
        Ok(content) => Ok(parse_proc_net_wireless(&content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(windows)]
pub async fn wifi_signal_percent() -> std::io::Result<Option<f64>> {
    let output = tokio::process::Command::new("netsh")
        .args(["wlan", "show", "interfaces"])
        .kill_on_drop(true)
        .output()
        .await?;
    Ok(parse_netsh_signal(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(not(any(target_os = "linux", windows)))]
pub async fn wifi_signal_percent() -> std::io::Result<Option<f64>> {
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIRELESS: &str = "\
Inter-| sta-|   Quality        |   Discarded packets               | Missed | WE
 face | tus | link level noise |  nwid  crypt   frag  retry   misc | beacon | 22
wlan0: 0000   56.  -54.  -256        0      0      0      0     12        0
";

    const NETSH: &str = "\
There is 1 interface on the system:

    Name                   : Wi-Fi
    State                  : connected
    SSID                   : office
    Radio type             : 802.11ac
    Receive rate (Mbps)    : 866.7
    Signal                 : 87%
    Profile                : office
";

    #[test]
    fn test_proc_net_wireless_quality() {
        assert_eq!(parse_proc_net_wireless(WIRELESS), Some(80.0));
    }

    #[test]
    fn test_no_wireless_interface() {
        let header_only: String = WIRELESS.lines().take(2).collect::<Vec<_>>().join("\n");
        assert_eq!(parse_proc_net_wireless(&header_only), None);
    }

    #[test]
    fn test_netsh_signal() {
        assert_eq!(parse_netsh_signal(NETSH), Some(87.0));
        assert_eq!(parse_netsh_signal("    State : disconnected\n"), None);
    }
}
