/// Extract the server-offered authentication methods from an OpenSSH
/// `Permission denied (a,b,c)` diagnostic, if the output contains one.
pub(crate) fn offered_auth_methods(stderr: &str) -> Option<Vec<String>> {
    const MARKER: &str = "Permission denied (";
    for line in stderr.lines() {
        let Some(index) = line.find(MARKER) else {
            continue;
        };
        let rest = &line[index + MARKER.len()..];
        let Some(end) = rest.find(')') else {
            continue;
        };
        let methods: Vec<String> = rest[..end]
            .split(',')
            .map(|method| method.trim().to_string())
            .filter(|method| !method.is_empty())
            .collect();
        if !methods.is_empty() {
            return Some(methods);
        }
    }
    None
}

pub(crate) fn supports_publickey(methods: &[String]) -> bool {
    methods.iter().any(|method| method == "publickey")
}
