//! Text transport for binary values: unpadded base64url, one value per file
//! or argument. Surrounding whitespace is ignored on input so files written
//! by editors with a trailing newline still load.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::error::Result;

pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

pub fn decode(text: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(text.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_safe_without_padding() {
        let text = encode([0xfb, 0xff, 0xfe]);
        assert_eq!(text, "-__-");
        assert_eq!(decode(" -__-\n").unwrap(), vec![0xfb, 0xff, 0xfe]);
        assert_eq!(encode([1u8]), "AQ");
    }

    #[test]
    fn standard_alphabet_rejected() {
        assert!(decode("+//+").is_err());
        assert!(decode("AQ==").is_err());
    }
}
