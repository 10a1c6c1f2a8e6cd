use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, PAGE_SIZE};

/// Codec for the engine's header page (the first allocated page).
///
/// The header page stores a small directory of (index name, root page id)
/// records so B+ tree roots survive restarts. Layout:
///
/// ```text
/// record_count (4) | records...
/// record: name_len (2) | name bytes | root_page_id (4)
/// ```
pub struct HeaderPage;

const COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

impl HeaderPage {
    pub fn init(page: &mut Page) {
        LittleEndian::write_u32(&mut page.data[COUNT_OFFSET..COUNT_OFFSET + 4], 0);
    }

    fn record_count(page: &Page) -> usize {
        LittleEndian::read_u32(&page.data[COUNT_OFFSET..COUNT_OFFSET + 4]) as usize
    }

    /// Walk the records, returning (offset, root) for a matching name.
    fn find(page: &Page, name: &str) -> Option<(usize, PageId)> {
        let count = Self::record_count(page);
        let mut offset = RECORDS_OFFSET;
        for _ in 0..count {
            let name_len = LittleEndian::read_u16(&page.data[offset..offset + 2]) as usize;
            let name_bytes = &page.data[offset + 2..offset + 2 + name_len];
            let root_offset = offset + 2 + name_len;
            let root = LittleEndian::read_u32(&page.data[root_offset..root_offset + 4]);
            if name_bytes == name.as_bytes() {
                return Some((root_offset, root));
            }
            offset = root_offset + 4;
        }
        None
    }

    /// End offset of the record area (where a new record would go)
    fn end_offset(page: &Page) -> usize {
        let count = Self::record_count(page);
        let mut offset = RECORDS_OFFSET;
        for _ in 0..count {
            let name_len = LittleEndian::read_u16(&page.data[offset..offset + 2]) as usize;
            offset += 2 + name_len + 4;
        }
        offset
    }

    /// Look up the root page id registered under `name`
    pub fn get_root(page: &Page, name: &str) -> Option<PageId> {
        Self::find(page, name).map(|(_, root)| root)
    }

    /// Register or update the root page id for `name`. Returns false when
    /// the record area is full.
    pub fn set_root(page: &mut Page, name: &str, root: PageId) -> bool {
        if let Some((root_offset, _)) = Self::find(page, name) {
            LittleEndian::write_u32(&mut page.data[root_offset..root_offset + 4], root);
            return true;
        }

        let offset = Self::end_offset(page);
        let record_len = 2 + name.len() + 4;
        if offset + record_len > PAGE_SIZE {
            return false;
        }

        LittleEndian::write_u16(&mut page.data[offset..offset + 2], name.len() as u16);
        page.data[offset + 2..offset + 2 + name.len()].copy_from_slice(name.as_bytes());
        let root_offset = offset + 2 + name.len();
        LittleEndian::write_u32(&mut page.data[root_offset..root_offset + 4], root);

        let count = Self::record_count(page) as u32 + 1;
        LittleEndian::write_u32(&mut page.data[COUNT_OFFSET..COUNT_OFFSET + 4], count);
        true
    }
}
