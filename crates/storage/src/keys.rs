//! Key construction helpers.
//!
//! Keys are `/`-separated paths. Prefixes always end in `/` so that an entity
//! whose ID is a byte-prefix of another's (`db-1` vs `db-10`) never matches
//! the wrong prefix scan.

/// Join path segments with `/`, dropping empty segments and collapsing
/// duplicate separators. A leading `/` on the first segment is preserved.
pub fn key<S: AsRef<str>>(parts: &[S]) -> String {
    let leading = parts
        .first()
        .map(|p| p.as_ref().starts_with('/'))
        .unwrap_or(false);
    let joined = parts
        .iter()
        .flat_map(|p| p.as_ref().split('/'))
        .filter(|seg| !seg.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if leading {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Like [`key`], but the result always ends in `/`.
pub fn prefix<S: AsRef<str>>(parts: &[S]) -> String {
    normalize_prefix(&key(parts))
}

/// Ensure a prefix ends in `/`.
pub fn normalize_prefix(p: &str) -> String {
    if p.ends_with('/') {
        p.to_string()
    } else {
        format!("{p}/")
    }
}

/// The smallest key strictly greater than every key starting with `p`.
///
/// Returns `"\0"` when every byte of the prefix is `0xff`, which etcd reads as
/// "to the end of the keyspace". Prefixes built by [`prefix`] are UTF-8 and
/// end in `/`, so in practice this just bumps the trailing separator.
pub fn prefix_range_end(p: &str) -> String {
    let mut bytes = p.as_bytes().to_vec();
    while let Some(last) = bytes.pop() {
        if last < 0xff {
            bytes.push(last + 1);
            return String::from_utf8_lossy(&bytes).into_owned();
        }
    }
    "\0".to_string()
}

/// Render a sequence number as fixed-width lowercase hex so that lexical key
/// order matches numeric order.
pub fn sequence_key(n: i64) -> String {
    format!("{n:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_joins_and_collapses() {
        assert_eq!(key(&["/root", "workflows", "a"]), "/root/workflows/a");
        assert_eq!(key(&["root/", "/x//y"]), "root/x/y");
        assert_eq!(key(&["", "a", ""]), "a");
    }

    #[test]
    fn prefix_always_has_trailing_slash() {
        assert_eq!(prefix(&["/root", "db-1"]), "/root/db-1/");
        assert_eq!(prefix(&["/root", "db-1/"]), "/root/db-1/");
        assert_eq!(normalize_prefix("/a/"), "/a/");
        assert_eq!(normalize_prefix("/a"), "/a/");
    }

    #[test]
    fn similar_ids_do_not_share_prefix() {
        let p1 = prefix(&["/root", "db-1"]);
        let k10 = key(&["/root", "db-10", "x"]);
        assert!(!k10.starts_with(&p1));
    }

    #[test]
    fn range_end_bumps_last_byte() {
        assert_eq!(prefix_range_end("/a/"), "/a0");
        assert!("/a/zzz" < prefix_range_end("/a/").as_str());
    }

    #[test]
    fn sequence_keys_sort_numerically() {
        assert_eq!(sequence_key(10), "000000000000000a");
        let mut keys: Vec<_> = [9, 10, 255, 1, 4096].iter().map(|n| sequence_key(*n)).collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                sequence_key(1),
                sequence_key(9),
                sequence_key(10),
                sequence_key(255),
                sequence_key(4096)
            ]
        );
    }
}
