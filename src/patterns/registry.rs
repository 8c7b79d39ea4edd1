//! Registry-controlled domains
//!
//! Lookups go through the Public Suffix List bundled with `psl`. Only ICANN
//! registries count: a wildcard on a private registry such as `appspot.com`
//! names one service, not every site. Hosts the list does not know (like
//! `notatld`) are not registries either.

use psl::Type;

/// True when `host` is itself a known ICANN public suffix
pub fn is_public_suffix(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }
    match psl::suffix(host.as_bytes()) {
        Some(suffix) => suffix.is_known() && suffix.typ() == Some(Type::Icann) && suffix.as_bytes() == host.as_bytes(),
        None => false,
    }
}
