//! Decoding the two binary layouts the core must stay byte-exact against: the database file
//! header's page-size field and the WAL header's page-size field.

pub const DB_HEADER_SIZE: usize = 100;
pub const WAL_HEADER_SIZE: usize = 32;

pub fn is_valid_page_size(n: u32) -> bool {
    n.is_power_of_two() && (512..=65536).contains(&n)
}

/// Decodes the database header's page-size field: big-endian at bytes [16,18), where a stored
/// value of 1 denotes 65536.
pub fn decode_db_page_size(header: &[u8]) -> Option<u32> {
    let raw = u16::from_be_bytes(header.get(16..18)?.try_into().ok()?);
    let size = if raw == 1 { 65536 } else { raw as u32 };
    is_valid_page_size(size).then_some(size)
}

/// Decodes the WAL header's page-size field: big-endian at bytes [8,12).
pub fn decode_wal_page_size(header: &[u8]) -> Option<u32> {
    let raw = u32::from_be_bytes(header.get(8..12)?.try_into().ok()?);
    is_valid_page_size(raw).then_some(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plain_page_size() {
        let mut hdr = [0u8; DB_HEADER_SIZE];
        hdr[16..18].copy_from_slice(&4096u16.to_be_bytes());
        assert_eq!(decode_db_page_size(&hdr), Some(4096));
    }

    #[test]
    fn one_means_65536() {
        let mut hdr = [0u8; DB_HEADER_SIZE];
        hdr[16..18].copy_from_slice(&1u16.to_be_bytes());
        assert_eq!(decode_db_page_size(&hdr), Some(65536));
    }

    #[test]
    fn rejects_non_power_of_two() {
        let mut hdr = [0u8; DB_HEADER_SIZE];
        hdr[16..18].copy_from_slice(&3000u16.to_be_bytes());
        assert_eq!(decode_db_page_size(&hdr), None);
    }

    #[test]
    fn wal_page_size_is_a_plain_be_u32() {
        let mut hdr = [0u8; WAL_HEADER_SIZE];
        hdr[8..12].copy_from_slice(&4096u32.to_be_bytes());
        assert_eq!(decode_wal_page_size(&hdr), Some(4096));
    }
}
