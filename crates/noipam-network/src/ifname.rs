//! Interface name generation.

use noipam_common::{NoipamError, NoipamResult};
use rand::Rng;

/// Longest interface name the kernel accepts (IFNAMSIZ - 1).
pub const IFNAME_MAX_LEN: usize = 15;

/// Generate an interface name `prefix` + `len` random hex characters that
/// `exists` reports as free.
///
/// # Errors
///
/// Returns a configuration error if the name would exceed
/// [`IFNAME_MAX_LEN`], or a conflict error if every attempt collided.
pub fn generate_interface_name<R, F>(
    rng: &mut R,
    prefix: &str,
    len: usize,
    attempts: usize,
    exists: F,
) -> NoipamResult<String>
where
    R: Rng,
    F: Fn(&str) -> bool,
{
    if len == 0 || prefix.len() + len > IFNAME_MAX_LEN {
        return Err(NoipamError::config(format!(
            "interface name '{prefix}' + {len} characters does not fit in {IFNAME_MAX_LEN} bytes"
        )));
    }

    let mut suffix = vec![0u8; len.div_ceil(2)];
    for attempt in 1..=attempts {
        rng.fill(suffix.as_mut_slice());
        let mut name = hex::encode(&suffix);
        name.truncate(len);
        name.insert_str(0, prefix);

        if !exists(&name) {
            return Ok(name);
        }
        tracing::debug!(name = %name, attempt, "Generated interface name already in use");
    }

    Err(NoipamError::conflict(format!(
        "could not find a free interface name with prefix '{prefix}' after {attempts} attempts"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::cell::Cell;

    #[test]
    fn generates_prefixed_names() {
        let mut rng = StdRng::seed_from_u64(1);
        let name = generate_interface_name(&mut rng, "veth", 7, 10, |_| false).unwrap();
        assert!(name.starts_with("veth"));
        assert_eq!(name.len(), 11);
        assert!(name[4..].bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn retries_on_collision() {
        let mut rng = StdRng::seed_from_u64(2);
        let calls = Cell::new(0);
        let name = generate_interface_name(&mut rng, "veth", 7, 10, |_| {
            calls.set(calls.get() + 1);
            calls.get() < 3
        })
        .unwrap();
        assert_eq!(calls.get(), 3);
        assert!(name.starts_with("veth"));
    }

    #[test]
    fn gives_up_after_attempts() {
        let mut rng = StdRng::seed_from_u64(3);
        let err = generate_interface_name(&mut rng, "veth", 7, 10, |_| true).unwrap_err();
        assert_eq!(err.kind(), noipam_common::ErrorKind::Conflict);
    }

    #[test]
    fn rejects_overlong_names() {
        let mut rng = StdRng::seed_from_u64(4);
        assert!(generate_interface_name(&mut rng, "verylongprefix", 7, 10, |_| false).is_err());
    }
}
