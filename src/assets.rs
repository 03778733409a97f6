use sha2::{Digest, Sha256};

/// Stored asset paths resolve against the platform's public CDN prefix.
pub const PUBLIC_ASSET_BASE: &str = "https://cdn.quizplatform.example/storage";

/// Seeded placeholder-avatar service used when a profile/participant has no
/// uploaded avatar.
pub const PLACEHOLDER_AVATAR_BASE: &str = "https://api.dicebear.com/7.x/identicon/svg";

/// Maps a stored path to its public URL. Absolute URLs pass through; blank
/// paths resolve to nothing.
pub fn public_asset_url(path: Option<&str>) -> Option<String> {
    let path = path.map(str::trim).filter(|p| !p.is_empty())?;
    if path.starts_with("http://") || path.starts_with("https://") {
        return Some(path.to_string());
    }
    Some(format!("{}/{}", PUBLIC_ASSET_BASE, path.trim_start_matches('/')))
}

/// Avatar URL with a deterministic placeholder fallback seeded by nickname,
/// so the same nickname always renders the same placeholder.
pub fn avatar_url(avatar_path: Option<&str>, nickname: &str) -> String {
    if let Some(url) = public_asset_url(avatar_path) {
        return url;
    }
    format!(
        "{}?seed={}",
        PLACEHOLDER_AVATAR_BASE,
        nickname_seed(nickname)
    )
}

fn nickname_seed(nickname: &str) -> String {
    let digest = Sha256::digest(nickname.as_bytes());
    let mut seed = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        seed.push_str(&format!("{:02x}", byte));
    }
    seed
}
