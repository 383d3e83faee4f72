/*!
Offset/limit pagination arithmetic.

Every paged view computes its window here so the rules live in one place:
page numbers are 1-based, absent or unparseable page parameters mean
page 1, and an empty record set still has one (empty) page.
*/
use serde::Serialize;

/// Children per page on the members-only teacher dashboard.
pub const ENROLLED_PAGE_SIZE: u32 = 7;
/// Children per page on the standalone teacher dashboard and admin register.
pub const REGISTER_PAGE_SIZE: u32 = 5;
/// Attendance/activity logs per page.
pub const LOG_PAGE_SIZE: u32 = 10;
/// Contact messages per page.
pub const MESSAGE_PAGE_SIZE: u32 = 10;

/// One window of an ordered record set, plus how many windows there are.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub total_pages: u32,
}

/// Parse a `?page=` query value. Anything absent, unparseable, or zero
/// means the first page.
pub fn parse_page(raw: Option<&str>) -> u32 {
    match raw.map(str::parse::<u32>) {
        Some(Ok(n)) if n > 0 => n,
        _ => 1,
    }
}

/// The OFFSET for a 1-based page number, as the i64 Postgres wants.
pub fn offset(page: u32, page_size: u32) -> i64 {
    (i64::from(page) - 1) * i64::from(page_size)
}

/// Number of pages needed for `total` records; never less than 1, so an
/// empty register still renders as "page 1 of 1".
pub fn total_pages(total: i64, page_size: u32) -> u32 {
    if total <= 0 {
        return 1;
    }
    let size = i64::from(page_size);
    let n = (total + size - 1) / size;
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_page_is_lenient() {
        assert_eq!(parse_page(None), 1);
        assert_eq!(parse_page(Some("")), 1);
        assert_eq!(parse_page(Some("banana")), 1);
        assert_eq!(parse_page(Some("0")), 1);
        assert_eq!(parse_page(Some("-3")), 1);
        assert_eq!(parse_page(Some("2")), 2);
        assert_eq!(parse_page(Some("17")), 17);
    }

    #[test]
    fn offset_arithmetic() {
        assert_eq!(offset(1, 10), 0);
        assert_eq!(offset(2, 10), 10);
        assert_eq!(offset(3, 7), 14);
        for page in 1..50u32 {
            for size in [5u32, 7, 10] {
                assert_eq!(
                    offset(page, size),
                    (i64::from(page) - 1) * i64::from(size)
                );
            }
        }
    }

    #[test]
    fn total_pages_ceiling_with_floor_of_one() {
        assert_eq!(total_pages(0, 10), 1);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(70, 7), 10);
        assert_eq!(total_pages(71, 7), 11);

        for total in 0..200i64 {
            for size in [5u32, 7, 10] {
                let expect = std::cmp::max(
                    1,
                    (total + i64::from(size) - 1) / i64::from(size)
                ) as u32;
                assert_eq!(total_pages(total, size), expect);
            }
        }
    }
}
