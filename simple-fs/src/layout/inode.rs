//! 磁盘 inode 与块链寻址
//!
//! 每个 inode 持有 5 个直接指针和 1 个间接指针；
//! 间接索引块整块连续存储**块编号**，每个编号指向一个数据块。
//! 指针数组只在 `size` 推算出的块数以内有效，
//! 其后的零值不是地址，表示"未分配"。
//!
//! ## 块索引编码
//!
//! - 逻辑索引小于直接指针数时直接取 `direct`
//! - 否则减去直接指针数，作为间接索引块的内部下标

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use block_dev::BlockDevice;

use crate::BLOCK_SIZE;
use crate::DataBlock;
use crate::block_cache;
use crate::free_map::FreeMap;

/// 每个 inode 的直接指针数
pub const DIRECT_COUNT: usize = 5;
/// 间接索引块的编号容量
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / mem::size_of::<u32>();
/// 每个 inode 表块容纳的 inode 个数
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
/// 单个文件的字节容量上限：直接块加上整个间接索引块
pub const MAX_FILE_SIZE: usize = (DIRECT_COUNT + POINTERS_PER_BLOCK) * BLOCK_SIZE;

pub(crate) const INODE_SIZE: usize = mem::size_of::<DiskInode>();

/// 间接索引块
pub(crate) type IndirectBlock = [u32; POINTERS_PER_BLOCK];

/// 磁盘上的定长 inode 记录
// 字段全部用u32是为了严控布局
#[derive(Default)]
#[repr(C)]
pub struct DiskInode {
    /// 有效标志：0 表示此槽位未创建或已删除
    valid: u32,
    /// 文件的逻辑大小(字节)，0 也是合法大小
    pub size: u32,
    /// 直接指针
    pub(crate) direct: [u32; DIRECT_COUNT],
    /// 间接索引块的编号，0 表示尚未分配
    pub(crate) indirect: u32,
}

impl DiskInode {
    /// 写入一个全新的零长度有效 inode
    #[inline]
    pub fn init(&mut self) {
        *self = Self {
            valid: 1,
            ..Default::default()
        };
    }

    #[inline]
    pub fn invalidate(&mut self) {
        self.valid = 0;
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid != 0
    }

    /// 逻辑上 inode 指向一串数据块，传入这串块的逻辑索引，
    /// 返回设备上的块编号
    pub fn block_id(&self, block_index: usize, block_device: &Arc<dyn BlockDevice>) -> u32 {
        if block_index < DIRECT_COUNT {
            self.direct[block_index]
        } else {
            block_cache::get(self.indirect as usize, block_device.clone())
                .lock()
                .map(0, |indirect: &IndirectBlock| {
                    // 剔去直接索引的部分
                    indirect[block_index - DIRECT_COUNT]
                })
        }
    }

    /// 当前大小推算出的全部在用块：直接块、间接索引块本身
    /// 以及被引用的间接数据块
    pub fn owned_blocks(&self, block_device: &Arc<dyn BlockDevice>) -> Vec<u32> {
        let data_blocks = Self::count_data_block(self.size);
        let mut owned = Vec::with_capacity(Self::count_total_block(self.size));

        owned.extend_from_slice(&self.direct[..data_blocks.min(DIRECT_COUNT)]);

        if data_blocks > DIRECT_COUNT {
            owned.push(self.indirect);
            block_cache::get(self.indirect as usize, block_device.clone())
                .lock()
                .map(0, |indirect: &IndirectBlock| {
                    owned.extend_from_slice(&indirect[..data_blocks - DIRECT_COUNT]);
                });
        }

        owned
    }

    /// 释放指针并把大小归零，返回原先在用的块；
    /// 块内容不清零，回收只是位图层面的重新归类
    pub fn clear(&mut self, block_device: &Arc<dyn BlockDevice>) -> Vec<u32> {
        let owned = self.owned_blocks(block_device);

        self.size = 0;
        self.direct.fill(0);
        self.indirect = 0;

        owned
    }

    /// 把文件增长到 `new_size`，缺的块从空闲位图按需分配，
    /// 返回实际达到的逻辑大小。
    ///
    /// 位图耗尽不是错误：大小结算在已分配块能覆盖的最后一个字节，
    /// 已拿到的块保持在用。目标大小始终被钳制在 [`MAX_FILE_SIZE`]，
    /// 间接索引因此不会越过 [`POINTERS_PER_BLOCK`]。
    pub fn grow_to(
        &mut self,
        new_size: u32,
        free_map: &mut FreeMap,
        block_device: &Arc<dyn BlockDevice>,
    ) -> u32 {
        let new_size = new_size.min(MAX_FILE_SIZE as u32);
        if new_size <= self.size {
            return self.size;
        }

        let mut allocated = Self::count_data_block(self.size);
        let wanted = Self::count_data_block(new_size);

        /******************** 直接索引 ********************/
        while allocated < wanted.min(DIRECT_COUNT) {
            let Some(block_id) = free_map.alloc() else {
                return self.settle(allocated, new_size);
            };
            self.direct[allocated] = block_id;
            allocated += 1;
        }
        /******************** END ********************/

        if wanted <= DIRECT_COUNT {
            return self.settle(allocated, new_size);
        }

        /******************** 间接索引 ********************/
        // 这次增长越过了直接容量，按需建立间接索引块；
        // 新拿到的块可能残留旧数据，编号数组必须从零开始
        if self.indirect == 0 {
            let Some(block_id) = free_map.alloc() else {
                return self.settle(allocated, new_size);
            };
            block_cache::get(block_id as usize, block_device.clone())
                .lock()
                .map_mut(0, |indirect: &mut IndirectBlock| indirect.fill(0));
            self.indirect = block_id;
        }

        allocated = block_cache::get(self.indirect as usize, block_device.clone())
            .lock()
            .map_mut(0, |indirect: &mut IndirectBlock| {
                let mut allocated = allocated;
                while allocated < wanted {
                    let Some(block_id) = free_map.alloc() else {
                        break;
                    };
                    indirect[allocated - DIRECT_COUNT] = block_id;
                    allocated += 1;
                }
                allocated
            });
        /******************** END ********************/

        self.settle(allocated, new_size)
    }

    /// 以实际持有的块数结算逻辑大小；大小只增不减
    fn settle(&mut self, allocated: usize, new_size: u32) -> u32 {
        self.size = self.size.max(new_size.min((allocated * BLOCK_SIZE) as u32));
        self.size
    }

    /// 从指定位置(字节偏移)读出数据填充 `buf`，
    /// 到达 `buf` 末尾或文件逻辑末尾即停止
    pub fn read_at(
        &self,
        offset: usize,
        buf: &mut [u8],
        block_device: &Arc<dyn BlockDevice>,
    ) -> usize {
        let mut start = offset;
        let end = (start + buf.len()).min(self.size as usize);

        if start >= end {
            return 0;
        }

        // 已读取多少字节
        let mut read_size = 0;
        loop {
            // 当前块的逻辑索引
            let block_index = start / BLOCK_SIZE;
            // 当前块的末地址(字节)
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_read_size = current_block_end - start;
            let dest = &mut buf[read_size..read_size + block_read_size];

            block_cache::get(
                self.block_id(block_index, block_device) as usize,
                block_device.clone(),
            )
            .lock()
            .map(0, |data_block: &DataBlock| {
                // 绝对地址 % 块大小 = 块内偏移
                let src = &data_block[start % BLOCK_SIZE..start % BLOCK_SIZE + block_read_size];
                dest.copy_from_slice(src);
            });

            read_size += block_read_size;

            if current_block_end == end {
                break;
            }

            start = current_block_end;
        }

        read_size
    }

    /// 从指定位置(字节偏移)写入 `buf` 的数据，
    /// 越过当前逻辑大小的部分被截断——调用方先用
    /// [`Self::grow_to`] 把大小扩到位
    pub fn write_at(
        &mut self,
        offset: usize,
        buf: &[u8],
        block_device: &Arc<dyn BlockDevice>,
    ) -> usize {
        let mut start = offset;
        let end = (start + buf.len()).min(self.size as usize);

        if start >= end {
            return 0;
        }

        let mut written_size = 0;
        loop {
            let block_index = start / BLOCK_SIZE;
            let current_block_end = ((block_index + 1) * BLOCK_SIZE).min(end);
            let block_write_size = current_block_end - start;

            block_cache::get(
                self.block_id(block_index, block_device) as usize,
                block_device.clone(),
            )
            .lock()
            .map_mut(0, |data_block: &mut DataBlock| {
                let src = &buf[written_size..written_size + block_write_size];
                let dest =
                    &mut data_block[start % BLOCK_SIZE..start % BLOCK_SIZE + block_write_size];
                dest.copy_from_slice(src);
            });

            written_size += block_write_size;

            if current_block_end == end {
                break;
            }

            start = current_block_end;
        }

        written_size
    }

    /// 计算容纳指定数据量需要多少个**数据块**
    #[inline]
    pub fn count_data_block(size: u32) -> usize {
        (size as usize).div_ceil(BLOCK_SIZE)
    }

    /// 计算容纳指定数据量需要多少个 **数据块** 和 **索引块**
    #[inline]
    pub fn count_total_block(size: u32) -> usize {
        let data_blocks = Self::count_data_block(size);
        // 超出直接索引才用得上间接索引块
        data_blocks + usize::from(data_blocks > DIRECT_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use core::mem;

    use super::*;

    #[test]
    fn record_size() {
        assert_eq!(32, mem::size_of::<DiskInode>());
        assert_eq!(128, INODES_PER_BLOCK);
        assert_eq!(1024, POINTERS_PER_BLOCK);
    }

    #[test]
    fn block_counting() {
        assert_eq!(0, DiskInode::count_data_block(0));
        assert_eq!(1, DiskInode::count_data_block(1));
        assert_eq!(1, DiskInode::count_data_block(BLOCK_SIZE as u32));
        assert_eq!(2, DiskInode::count_data_block(BLOCK_SIZE as u32 + 1));

        let direct_cap = (DIRECT_COUNT * BLOCK_SIZE) as u32;
        assert_eq!(DIRECT_COUNT, DiskInode::count_total_block(direct_cap));
        // 越过直接容量后要算上间接索引块
        assert_eq!(DIRECT_COUNT + 2, DiskInode::count_total_block(direct_cap + 1));
    }
}
