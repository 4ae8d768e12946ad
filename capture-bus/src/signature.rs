use bytes::Bytes;

use crate::error::{CaptureError, Result};

/// Supplies the byte sequence that opens every image in a multi-part stream.
pub trait SignatureProvider: Send + Sync {
    fn resolve(&self) -> Result<Bytes>;
}

/// A signature known up front.
#[derive(Clone, Debug)]
pub struct FixedSignature(Bytes);

impl FixedSignature {
    pub fn new(signature: impl Into<Bytes>) -> Self {
        Self(signature.into())
    }

    /// Parses a hex string such as `"ff d8 ff db"`, `"ff:d8"` or `"ffd8ffdb"`.
    pub fn from_hex(text: &str) -> Result<Self> {
        let digits: String = text
            .chars()
            .filter(|c| !c.is_ascii_whitespace() && *c != ':')
            .collect();
        if digits.is_empty() {
            return Err(CaptureError::InvalidSignature(
                "hex signature is empty".to_string(),
            ));
        }
        let bytes = hex::decode(&digits)
            .map_err(|e| CaptureError::InvalidSignature(format!("{:?}: {}", text, e)))?;
        Ok(Self(Bytes::from(bytes)))
    }
}

impl SignatureProvider for FixedSignature {
    fn resolve(&self) -> Result<Bytes> {
        if self.0.is_empty() {
            return Err(CaptureError::InvalidSignature(
                "signature must not be empty".to_string(),
            ));
        }
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hex_accepts_separators() {
        let sig = FixedSignature::from_hex("ff d8:FF db").unwrap();
        assert_eq!(sig.resolve().unwrap().as_ref(), &[0xff, 0xd8, 0xff, 0xdb]);
    }

    #[test]
    fn test_from_hex_rejects_garbage() {
        assert!(FixedSignature::from_hex("").is_err());
        assert!(FixedSignature::from_hex("abc").is_err());
        assert!(FixedSignature::from_hex("zz").is_err());
        assert!(FixedSignature::from_hex(" : ").is_err());
    }

    #[test]
    fn test_from_hex_error_names_the_input() {
        let err = FixedSignature::from_hex("ff d8 fg").unwrap_err();
        assert!(matches!(&err, CaptureError::InvalidSignature(msg) if msg.contains("ff d8 fg")));
    }

    #[test]
    fn test_empty_fixed_signature_does_not_resolve() {
        assert!(FixedSignature::new(Bytes::new()).resolve().is_err());
    }
}
