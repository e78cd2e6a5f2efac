use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

/// Computes the `authentication` string for an `Identify` frame.
///
/// `secret = base64(sha256(password + salt))`, then
/// `response = base64(sha256(secret + challenge))`. The intermediate secret is
/// password-equivalent for this server and is zeroized when dropped.
pub fn auth_response(password: &SecretString, salt: &str, challenge: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.expose_secret().as_bytes());
    hasher.update(salt.as_bytes());
    let secret = SecretString::from(STANDARD.encode(hasher.finalize()));

    let mut hasher = Sha256::new();
    hasher.update(secret.expose_secret().as_bytes());
    hasher.update(challenge.as_bytes());
    STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn matches_reference_fixture() {
        let response = auth_response(
            &secret("supersecretpassword"),
            "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=",
            "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=",
        );
        assert_eq!(response, "1Ct943GAT+6YQUUX47Ia/ncufilbe6+oD6lY+5kaCu4=");
    }

    #[test]
    fn matches_second_fixture() {
        let response = auth_response(&secret("hunter2"), "c2FsdA==", "Y2hhbGxlbmdl");
        assert_eq!(response, "HbemcTRAK8GnBZpkRzKZdmk94xa5VYtjm6/uKbA1epI=");
    }

    #[test]
    fn empty_password_is_still_hashed() {
        let response = auth_response(&secret(""), "salt", "challenge");
        assert_eq!(response, "5fmcrqR0I7snYOpUX/Ac22UdSA81TwCyHqCr6eFQyyI=");
    }

    #[test]
    fn is_deterministic() {
        let a = auth_response(&secret("pw"), "s", "c");
        let b = auth_response(&secret("pw"), "s", "c");
        assert_eq!(a, b);
    }

    #[test]
    fn depends_on_every_input() {
        let base = auth_response(&secret("pw"), "s", "c");
        assert_ne!(base, auth_response(&secret("pw2"), "s", "c"));
        assert_ne!(base, auth_response(&secret("pw"), "s2", "c"));
        assert_ne!(base, auth_response(&secret("pw"), "s", "c2"));
    }
}
