//! Authorization predicates.

/// Whether `user_pubkey` is the admin. False when either side is missing.
pub fn is_admin(user_pubkey: Option<&str>, admin_pubkey: Option<&str>) -> bool {
    match (user_pubkey, admin_pubkey) {
        (Some(user), Some(admin)) => !user.is_empty() && user == admin,
        _ => false,
    }
}

/// Whether `user_pubkey` may moderate. The admin always may.
pub fn is_moderator<S: AsRef<str>>(
    user_pubkey: Option<&str>,
    moderators: &[S],
    admin_pubkey: Option<&str>,
) -> bool {
    let Some(user) = user_pubkey.filter(|u| !u.is_empty()) else {
        return false;
    };
    is_admin(Some(user), admin_pubkey) || moderators.iter().any(|m| m.as_ref() == user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_admin() {
        assert!(is_admin(Some("admin"), Some("admin")));
        assert!(!is_admin(Some("user"), Some("admin")));
        assert!(!is_admin(None, Some("admin")));
        assert!(!is_admin(Some("admin"), None));
        assert!(!is_admin(Some(""), Some("")));
    }

    #[test]
    fn test_is_moderator() {
        let moderators = ["m1", "m2"];
        assert!(is_moderator(Some("m2"), &moderators, None));
        assert!(!is_moderator(Some("x"), &moderators, None));
        assert!(is_moderator(Some("admin"), &moderators, Some("admin")));
        assert!(!is_moderator(None, &moderators, Some("admin")));
        assert!(!is_moderator::<&str>(Some("admin"), &[], None));
    }
}
