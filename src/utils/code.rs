use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::User;

type HmacSha256 = Hmac<Sha256>;

/// How long a confirmation code stays valid after it was issued.
pub const CODE_TTL_SECS: i64 = 24 * 60 * 60;

/// Hex characters of the MAC kept in the code.
const MAC_LEN: usize = 20;

/// Builds a confirmation code for the user's current persisted state.
///
/// The code is `"<issued_at_hex>-<mac>"` where the MAC covers the user's
/// id, username, role, `updated_at` and the issue timestamp, keyed by the
/// server secret. Nothing is stored: `check_code` recomputes the MAC from
/// the timestamp embedded in the code and the user's current state, so a
/// code dies when it ages past the TTL or when any bound state changes.
pub fn make_code(user: &User, secret: &[u8]) -> String {
    make_code_at(user, secret, Utc::now().timestamp())
}

/// Verifies a presented code against the user's current state.
pub fn check_code(user: &User, code: &str, secret: &[u8]) -> bool {
    check_code_at(user, code, secret, Utc::now().timestamp())
}

fn make_code_at(user: &User, secret: &[u8], issued_at: i64) -> String {
    format!("{:x}-{}", issued_at, signature(user, secret, issued_at))
}

fn check_code_at(user: &User, code: &str, secret: &[u8], now: i64) -> bool {
    let Some((ts_part, mac_part)) = code.split_once('-') else {
        return false;
    };
    let Ok(issued_at) = i64::from_str_radix(ts_part, 16) else {
        return false;
    };
    if issued_at > now || now - issued_at > CODE_TTL_SECS {
        return false;
    }

    let expected = signature(user, secret, issued_at);
    // Compare without early exit so the match position is not observable.
    mac_part.len() == expected.len()
        && mac_part
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn signature(user: &User, secret: &[u8], issued_at: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(user.id.as_bytes());
    mac.update(user.username.as_bytes());
    mac.update(user.role.to_str().as_bytes());
    if let Some(updated_at) = user.updated_at {
        mac.update(&updated_at.timestamp_micros().to_be_bytes());
    }
    mac.update(&issued_at.to_be_bytes());

    let digest = mac.finalize().into_bytes();
    format!("{:x}", digest)[..MAC_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRole;
    use chrono::TimeZone;
    use uuid::Uuid;

    const SECRET: &[u8] = b"code-test-secret";
    const NOW: i64 = 1_700_000_000;

    fn sample_user() -> User {
        User {
            id: Uuid::parse_str("4ac1dc73-7e17-4f1e-b5a1-0d6b1b1c2a3b").unwrap(),
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            first_name: None,
            last_name: None,
            bio: None,
            role: UserRole::User,
            created_at: None,
            updated_at: Some(Utc.with_ymd_and_hms(2023, 11, 1, 12, 0, 0).unwrap()),
        }
    }

    #[test]
    fn fresh_code_verifies() {
        let user = sample_user();
        let code = make_code_at(&user, SECRET, NOW);
        assert!(check_code_at(&user, &code, SECRET, NOW));
        assert!(check_code_at(&user, &code, SECRET, NOW + 60));
    }

    #[test]
    fn code_is_deterministic_for_a_fixed_state_and_instant() {
        let user = sample_user();
        assert_eq!(
            make_code_at(&user, SECRET, NOW),
            make_code_at(&user, SECRET, NOW)
        );
    }

    #[test]
    fn tampered_code_fails() {
        let user = sample_user();
        let code = make_code_at(&user, SECRET, NOW);
        let mut tampered = code.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert!(!check_code_at(&user, &tampered, SECRET, NOW));
    }

    #[test]
    fn expired_code_fails() {
        let user = sample_user();
        let code = make_code_at(&user, SECRET, NOW);
        assert!(check_code_at(&user, &code, SECRET, NOW + CODE_TTL_SECS));
        assert!(!check_code_at(&user, &code, SECRET, NOW + CODE_TTL_SECS + 1));
    }

    #[test]
    fn code_issued_in_the_future_fails() {
        let user = sample_user();
        let code = make_code_at(&user, SECRET, NOW + 100);
        assert!(!check_code_at(&user, &code, SECRET, NOW));
    }

    #[test]
    fn state_change_invalidates_outstanding_codes() {
        let user = sample_user();
        let code = make_code_at(&user, SECRET, NOW);

        let mut promoted = user.clone();
        promoted.role = UserRole::Moderator;
        assert!(!check_code_at(&promoted, &code, SECRET, NOW));

        let mut touched = user.clone();
        touched.updated_at = Some(Utc.with_ymd_and_hms(2023, 11, 2, 9, 30, 0).unwrap());
        assert!(!check_code_at(&touched, &code, SECRET, NOW));
    }

    #[test]
    fn wrong_secret_fails() {
        let user = sample_user();
        let code = make_code_at(&user, SECRET, NOW);
        assert!(!check_code_at(&user, &code, b"another-secret", NOW));
    }

    #[test]
    fn malformed_codes_fail() {
        let user = sample_user();
        for code in ["", "-", "no-dash-mac", "zzz", "123", &"9".repeat(64)] {
            assert!(!check_code_at(&user, code, SECRET, NOW), "code: {code:?}");
        }
    }

    #[test]
    fn another_users_code_fails() {
        let alice = sample_user();
        let mut bob = sample_user();
        bob.id = Uuid::parse_str("0f8fad5b-d9cb-469f-a165-70867728950e").unwrap();
        bob.username = "bob".to_string();

        let code = make_code_at(&alice, SECRET, NOW);
        assert!(!check_code_at(&bob, &code, SECRET, NOW));
    }
}
