//! 十六进制报文转换
//!
//! HTTP 推送的报文以十六进制文本提交，进入路由前先规范化为字节：
//! 去除空白与连字符，奇数长度左补一个 `0`，大小写均可。

use crate::error::ProtocolError;

/// 十六进制文本转字节
pub fn hex_to_bytes(text: &str) -> Result<Vec<u8>, ProtocolError> {
    let mut digits: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if digits.len() % 2 == 1 {
        digits.insert(0, '0');
    }
    hex::decode(&digits).map_err(|e| ProtocolError::InvalidHex(e.to_string()))
}

/// 字节转大写十六进制文本
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// 日志用的报文预览（超出部分以 `..` 结尾）
pub fn hex_preview(bytes: &[u8], max_bytes: usize) -> String {
    if bytes.len() <= max_bytes {
        return bytes_to_hex(bytes);
    }
    format!("{}..({} bytes)", bytes_to_hex(&bytes[..max_bytes]), bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_with_separators() {
        assert_eq!(
            hex_to_bytes("aa 55-00-01").unwrap(),
            vec![0xAA, 0x55, 0x00, 0x01]
        );
        assert_eq!(hex_to_bytes("7e\n81\t0A").unwrap(), vec![0x7E, 0x81, 0x0A]);
    }

    #[test]
    fn test_hex_odd_length_is_left_padded() {
        assert_eq!(hex_to_bytes("abc").unwrap(), vec![0x0A, 0xBC]);
        assert_eq!(hex_to_bytes("F").unwrap(), vec![0x0F]);
    }

    #[test]
    fn test_hex_round_trip_mixed_case() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let text = bytes_to_hex(&bytes);
        assert_eq!(hex_to_bytes(&text).unwrap(), bytes);
        assert_eq!(hex_to_bytes(&text.to_lowercase()).unwrap(), bytes);
        assert!(hex_to_bytes("").unwrap().is_empty());
    }

    #[test]
    fn test_hex_rejects_non_hex() {
        assert!(matches!(
            hex_to_bytes("zz"),
            Err(ProtocolError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(hex_preview(&[0x55, 0xAA], 8), "55AA");
        assert_eq!(hex_preview(&[1, 2, 3, 4], 2), "0102..(4 bytes)");
    }
}
