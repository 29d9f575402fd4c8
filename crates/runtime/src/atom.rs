//! Atom helpers layered on `purc_variant::atom`'s named buckets.
//!
//! `spec.md` §3 names two buckets implicitly: the MSG bucket (message
//! type/sub-type and exception names, a closed-ish vocabulary the
//! runtime itself defines) and the USER bucket (names the hosting
//! program interns — coroutine full names, dynamic-object keys).

use purc_variant::{intern, try_lookup, Atom, AtomBucketId};

/// Interns an exception/except-template tag name in the MSG bucket.
pub fn except_atom(name: &str) -> Atom {
    intern(AtomBucketId::Msg, name)
}

/// Interns a `type:sub-type` message name in the MSG bucket.
pub fn msg_atom(event_type: &str, sub_type: Option<&str>) -> Atom {
    match sub_type {
        Some(sub) => intern(AtomBucketId::Msg, &format!("{event_type}:{sub}")),
        None => intern(AtomBucketId::Msg, event_type),
    }
}

/// Interns a coroutine's full name (`spec.md` §6) in the USER bucket:
/// `"<endpoint-name>/COROUTINE-<unique-id>"`.
pub fn coroutine_atom(endpoint: &str, unique_id: u64) -> Atom {
    intern(AtomBucketId::User, &format!("{endpoint}/COROUTINE-{unique_id}"))
}

/// Looks up an already-interned coroutine atom by its full name,
/// without creating one — used for cross-instance routing lookups.
pub fn try_lookup_user(name: &str) -> Option<Atom> {
    try_lookup(AtomBucketId::User, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_atoms_join_type_and_sub_type() {
        let a = msg_atom("callState", Some("success"));
        assert_eq!(a.to_string(), "callState:success");
    }

    #[test]
    fn coroutine_atoms_follow_the_full_name_format() {
        let a = coroutine_atom("main", 7);
        assert_eq!(a.to_string(), "main/COROUTINE-7");
        assert_eq!(try_lookup_user("main/COROUTINE-7"), Some(a));
    }
}
