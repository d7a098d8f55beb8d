//! Cache key layout

use common::UserId;

/// Cached preference record
pub fn preference_key(user_id: &UserId) -> String {
    format!("user_match_pref:{}", user_id)
}

/// Cached topic list, kept alongside the preference record
pub fn topics_key(user_id: &UserId) -> String {
    format!("user_topics:{}", user_id)
}

/// Pointer from a user to their active match id
pub fn match_key(user_id: &UserId) -> String {
    format!("match:{}", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let user = UserId::from("user123");
        assert_eq!(preference_key(&user), "user_match_pref:user123");
        assert_eq!(topics_key(&user), "user_topics:user123");
        assert_eq!(match_key(&user), "match:user123");
    }
}
