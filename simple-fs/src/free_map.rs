//! # 空闲块分配层
//!
//! 空闲块位图只存在于内存：挂载时扫描超级块、inode 表
//! 和所有有效 inode 的指针集合重建，卸载即丢弃。
//! 置位表示块**在用**，清零表示空闲。
//!
//! 分配策略为首次适应：从编号 0 起向上找第一个空闲块。

use alloc::vec;
use alloc::vec::Vec;

/// 一组 64 位
const GROUP_BITS: usize = u64::BITS as usize;

pub(crate) struct FreeMap {
    groups: Vec<u64>,
    free: usize,
}

impl FreeMap {
    /// 建立全空闲的位图；末组中超出 `total_blocks` 的补位永久置为在用
    pub fn new(total_blocks: usize) -> Self {
        let mut groups = vec![0u64; total_blocks.div_ceil(GROUP_BITS)];

        let tail = total_blocks % GROUP_BITS;
        if tail != 0 {
            *groups.last_mut().unwrap() = !0 << tail;
        }

        Self {
            groups,
            free: total_blocks,
        }
    }

    /// 分配编号最小的空闲块；位图耗尽则返回空
    pub fn alloc(&mut self) -> Option<u32> {
        let (group_index, ingroup_index) = self
            .groups
            .iter()
            .enumerate()
            .find_map(|(group_index, &bits)| {
                (bits != u64::MAX).then_some((group_index, bits.trailing_ones() as usize))
            })?;

        self.groups[group_index] |= 1 << ingroup_index;
        self.free -= 1;

        Some((group_index * GROUP_BITS + ingroup_index) as u32)
    }

    /// 标记块在用。挂载扫描按 inode 逐个推进，
    /// 重复标记同一块是无害的。
    pub fn set_used(&mut self, block_id: u32) {
        let (group_index, ingroup_index) = Self::locate(block_id);
        let bit = 1 << ingroup_index;

        if self.groups[group_index] & bit == 0 {
            self.groups[group_index] |= bit;
            self.free -= 1;
        }
    }

    pub fn free(&mut self, block_id: u32) {
        let (group_index, ingroup_index) = Self::locate(block_id);
        let bit = 1 << ingroup_index;

        // 释放的块一定在用
        assert_ne!(self.groups[group_index] & bit, 0);

        self.groups[group_index] -= bit;
        self.free += 1;
    }

    /// 空闲块数量
    #[inline]
    pub fn free_count(&self) -> usize {
        self.free
    }

    #[inline]
    fn locate(block_id: u32) -> (usize, usize) {
        let block_id = block_id as usize;
        (block_id / GROUP_BITS, block_id % GROUP_BITS)
    }
}
