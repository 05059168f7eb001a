//! Shared from-Unicode trie assembly for the built-in codepages under
//! [`crate::tables`].
//!
//! A codepage source file lists its mappings as a sparse `{code point: byte
//! value}` table; these helpers turn that sparse list into the flat
//! stage1/stage2/stage3 arrays [`crate::from_unicode`] walks, the same shape
//! [`crate::table::Table::from_bytes`] produces from a file. Every page and
//! leaf with no mappings shares one all-absent block, so an otherwise-empty
//! 64-entry BMP [`crate::table::Stage1`] costs one shared page and one
//! shared leaf, not 64 of each.

use std::collections::BTreeMap;

use crate::table::{SBCS_KIND_FALLBACK, SBCS_KIND_ROUNDTRIP};

/// Builds the SBCS-shaped trie (pairs with [`crate::table::Stage2::Sbcs`] /
/// [`crate::table::FromUnicodeBytes::Sbcs`]) from a sparse
/// `{code point: (is_roundtrip, byte)}` map.
pub(crate) fn build_sbcs_trie(entries: &BTreeMap<u32, (bool, u8)>) -> (Vec<u16>, Vec<u16>, Vec<u16>) {
    let mut leaves: BTreeMap<(u32, u32), [u16; 16]> = BTreeMap::new();
    for (&c, &(roundtrip, byte)) in entries {
        let page = c >> 10;
        let block = (c >> 4) & 0x3F;
        let slot = (c & 0xF) as usize;
        let kind = if roundtrip {
            SBCS_KIND_ROUNDTRIP
        } else {
            SBCS_KIND_FALLBACK
        };
        let word = (kind << 8) | byte as u16;
        leaves.entry((page, block)).or_insert([0u16; 16])[slot] = word;
    }
    render_sbcs(&leaves)
}

fn render_sbcs(leaves: &BTreeMap<(u32, u32), [u16; 16]>) -> (Vec<u16>, Vec<u16>, Vec<u16>) {
    let mut stage3 = vec![0u16; 16];
    let mut leaf_index: BTreeMap<(u32, u32), u16> = BTreeMap::new();
    for (&key, leaf) in leaves {
        let idx = (stage3.len() / 16) as u16;
        stage3.extend_from_slice(leaf);
        leaf_index.insert(key, idx);
    }

    let mut pages: BTreeMap<u32, ()> = BTreeMap::new();
    for &(page, _) in leaves.keys() {
        pages.insert(page, ());
    }

    let mut stage2 = vec![0u16; 64];
    let mut stage1 = vec![0u16; 64];
    for &page in pages.keys() {
        let base = stage2.len() as u16;
        let mut row = vec![0u16; 64];
        for block in 0..64u32 {
            if let Some(&idx) = leaf_index.get(&(page, block)) {
                row[block as usize] = idx;
            }
        }
        stage2.extend_from_slice(&row);
        stage1[page as usize] = base;
    }

    (stage1, stage2, stage3)
}

/// Builds the MBCS-shaped trie for a 16-bit stage-3 pool (pairs with
/// [`crate::table::FromUnicodeBytes::Word16`], used by DBCS and SISO tables)
/// from a sparse `{code point: (is_roundtrip, raw word)}` map.
pub(crate) fn build_mbcs_trie_word16(
    entries: &BTreeMap<u32, (bool, u16)>,
) -> (Vec<u16>, Vec<u32>, Vec<u16>) {
    let mut leaves: BTreeMap<(u32, u32), ([u16; 16], u16)> = BTreeMap::new();
    for (&c, &(roundtrip, raw)) in entries {
        let page = c >> 10;
        let block = (c >> 4) & 0x3F;
        let slot = (c & 0xF) as usize;
        let entry = leaves.entry((page, block)).or_insert(([0u16; 16], 0u16));
        entry.0[slot] = raw;
        if roundtrip {
            entry.1 |= 1 << slot;
        }
    }

    let mut stage3 = vec![0u16; 16];
    let mut leaf_index: BTreeMap<(u32, u32), (u16, u16)> = BTreeMap::new();
    for (&key, (leaf, bits)) in &leaves {
        let idx = (stage3.len() / 16) as u16;
        stage3.extend_from_slice(leaf);
        leaf_index.insert(key, (idx, *bits));
    }

    let mut pages: BTreeMap<u32, ()> = BTreeMap::new();
    for &(page, _) in leaves.keys() {
        pages.insert(page, ());
    }

    let mut stage2 = vec![0u32; 64];
    let mut stage1 = vec![0u16; 64];
    for &page in pages.keys() {
        let base = stage2.len() as u16;
        let mut row = vec![0u32; 64];
        for block in 0..64u32 {
            if let Some(&(idx, bits)) = leaf_index.get(&(page, block)) {
                row[block as usize] = idx as u32 | ((bits as u32) << 16);
            }
        }
        stage2.extend_from_slice(&row);
        stage1[page as usize] = base;
    }

    (stage1, stage2, stage3)
}

/// Builds the MBCS-shaped trie for a 32-bit stage-3 pool (pairs with
/// [`crate::table::FromUnicodeBytes::Word32`], used by the GB 18030 table's
/// ASCII passthrough).
pub(crate) fn build_mbcs_trie_word32(
    entries: &BTreeMap<u32, (bool, u32)>,
) -> (Vec<u16>, Vec<u32>, Vec<u32>) {
    let mut leaves: BTreeMap<(u32, u32), ([u32; 16], u16)> = BTreeMap::new();
    for (&c, &(roundtrip, raw)) in entries {
        let page = c >> 10;
        let block = (c >> 4) & 0x3F;
        let slot = (c & 0xF) as usize;
        let entry = leaves.entry((page, block)).or_insert(([0u32; 16], 0u16));
        entry.0[slot] = raw;
        if roundtrip {
            entry.1 |= 1 << slot;
        }
    }

    let mut stage3 = vec![0u32; 16];
    let mut leaf_index: BTreeMap<(u32, u32), (u16, u16)> = BTreeMap::new();
    for (&key, (leaf, bits)) in &leaves {
        let idx = (stage3.len() / 16) as u16;
        stage3.extend_from_slice(leaf);
        leaf_index.insert(key, (idx, *bits));
    }

    let mut pages: BTreeMap<u32, ()> = BTreeMap::new();
    for &(page, _) in leaves.keys() {
        pages.insert(page, ());
    }

    let mut stage2 = vec![0u32; 64];
    let mut stage1 = vec![0u16; 64];
    for &page in pages.keys() {
        let base = stage2.len() as u16;
        let mut row = vec![0u32; 64];
        for block in 0..64u32 {
            if let Some(&(idx, bits)) = leaf_index.get(&(page, block)) {
                row[block as usize] = idx as u32 | ((bits as u32) << 16);
            }
        }
        stage2.extend_from_slice(&row);
        stage1[page as usize] = base;
    }

    (stage1, stage2, stage3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sbcs_trie_round_trips_a_scattered_mapping() {
        let mut entries = BTreeMap::new();
        entries.insert(0x41u32, (true, 0x41u8));
        entries.insert(0x20ACu32, (true, 0x80u8));
        let (stage1, stage2, stage3) = build_sbcs_trie(&entries);

        let idx_a = stage1[(0x41u32 >> 10) as usize] as usize + (((0x41u32 >> 4) & 0x3F) as usize);
        let leaf_a = stage2[idx_a] as usize;
        assert_eq!(stage3[leaf_a * 16 + (0x41 & 0xF)] & 0xFF, 0x41);

        let idx_euro =
            stage1[(0x20ACu32 >> 10) as usize] as usize + (((0x20ACu32 >> 4) & 0x3F) as usize);
        let leaf_euro = stage2[idx_euro] as usize;
        assert_eq!(stage3[leaf_euro * 16 + (0x20AC & 0xF)] & 0xFF, 0x80);
    }

    #[test]
    fn unmapped_pages_share_the_empty_block() {
        let entries = BTreeMap::new();
        let (stage1, _stage2, stage3) = build_sbcs_trie(&entries);
        assert!(stage1.iter().all(|&v| v == 0));
        assert_eq!(stage3.len(), 16);
    }
}
