// Network interface classification

const VIRTUAL_MARKERS: &[&str] = &[
    "virtual",
    "veth",
    "vethernet",
    "docker",
    "br-",
    "virbr",
    "hyper-v",
    "wsl",
    "loopback",
    "vmware",
    "vmnet",
    "virtualbox",
    "vboxnet",
    "host-only",
    "wi-fi direct",
    "bluetooth",
];

/// Whether an adapter is virtual (hypervisor, container bridge, loopback)
/// and should be left out of physical throughput totals.
pub fn is_virtual_interface(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower == "lo" || lower.starts_with("lo0") || VIRTUAL_MARKERS.iter().any(|m| lower.contains(m))
}

/// Whether an adapter name matches any of the given keywords (case-insensitive)
pub fn name_matches(name: &str, keywords: &[String]) -> bool {
    let lower = name.to_lowercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
}
