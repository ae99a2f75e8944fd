pub const TIDEMARK_LOCK_KEY_NAMESPACE: u64 = 0x5449_4445_4d41_524b;

/// Derives the advisory lock key for a database: FNV-1a over the name, mixed
/// with a namespace so unrelated tools locking on the same name do not collide.
pub fn lock_key(database_name: &str) -> i64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in database_name.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }

    (hash ^ TIDEMARK_LOCK_KEY_NAMESPACE) as i64
}
