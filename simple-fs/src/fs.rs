//! # 文件系统管理层
//!
//! [`SimpleFileSystem`] 是挂载后的卷：持有设备和空闲块位图，
//! 按 inode 编号提供增删读写。"必须先挂载"由类型保证——
//! 这些操作只存在于挂载成功得到的值上。
//!
//! inode 编号从 1 起有效，全局 0 号永久保留；
//! 编号除以每块 inode 数再加一得到所在块，取余得到块内槽位。

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use core::fmt;

use block_dev::BlockDevice;
use log::{info, warn};

use crate::DataBlock;
use crate::block_cache;
use crate::error::{FsError, FsResult};
use crate::free_map::FreeMap;
use crate::layout::*;

pub struct SimpleFileSystem {
    block_device: Arc<dyn BlockDevice>,
    free_map: FreeMap,
    /// inode 表占据的块数
    inode_blocks: usize,
}

/// inode 的元信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub inumber: u32,
    /// 逻辑大小(字节)
    pub size: u32,
    /// 数据块个数
    pub data_blocks: u32,
    /// 在用块总数，算上间接索引块
    pub total_blocks: u32,
}

impl SimpleFileSystem {
    /// 格式化设备：抹掉全部现有数据，预留十分之一的块
    /// (向下取整加一)作 inode 表，写入新的超级块。
    ///
    /// 重复格式化未挂载的卷得到相同布局。
    /// 已挂载的卷不可格式化——先让挂载值离开作用域。
    pub fn format(block_device: &Arc<dyn BlockDevice>) -> FsResult<()> {
        let nblocks = block_device.block_count();
        let ninodeblocks = nblocks / 10 + 1;

        // inode 表之外至少要有一个数据块
        if ninodeblocks + 1 >= nblocks {
            warn!("format: {nblocks} blocks are too few");
            return Err(FsError::TooFewBlocks);
        }

        for block_id in 0..nblocks {
            block_cache::get(block_id, block_device.clone())
                .lock()
                .map_mut(0, |data_block: &mut DataBlock| data_block.fill(0));
        }

        block_cache::get(0, block_device.clone())
            .lock()
            .map_mut(0, |super_block: &mut SuperBlock| {
                super_block.init(
                    nblocks as u32,
                    ninodeblocks as u32,
                    INODES_PER_BLOCK as u32,
                )
            });
        block_cache::sync_all();

        info!("format: {nblocks} blocks, {ninodeblocks} of them for inodes");
        Ok(())
    }

    /// 挂载设备：校验超级块魔数，然后扫描 inode 表重建空闲块位图。
    /// 超级块和 inode 表所占的块永久在用；
    /// 每个有效 inode 按其大小推算出的指针集合也标记在用。
    pub fn mount(block_device: Arc<dyn BlockDevice>) -> FsResult<Self> {
        let Some((nblocks, ninodeblocks)) = block_cache::get(0, block_device.clone())
            .lock()
            .map(0, |super_block: &SuperBlock| {
                super_block
                    .is_valid()
                    .then_some((super_block.nblocks as usize, super_block.ninodeblocks as usize))
            })
        else {
            warn!("mount: magic number is invalid");
            return Err(FsError::NotFormatted);
        };

        let mut free_map = FreeMap::new(nblocks);
        for block_id in 0..=ninodeblocks {
            free_map.set_used(block_id as u32);
        }

        for block in 1..=ninodeblocks {
            let cache = block_cache::get(block, block_device.clone());
            let cache = cache.lock();

            for slot in 0..INODES_PER_BLOCK {
                let inode: &DiskInode = cache.get(slot * INODE_SIZE);
                if inode.is_valid() {
                    for block_id in inode.owned_blocks(&block_device) {
                        free_map.set_used(block_id);
                    }
                }
            }
        }

        info!(
            "mount: {nblocks} blocks, {} of them free",
            free_map.free_count()
        );

        Ok(Self {
            block_device,
            free_map,
            inode_blocks: ninodeblocks,
        })
    }

    /// 同步缓存并卸载；空闲块位图随之丢弃
    pub fn unmount(self) {
        block_cache::sync_all();
    }

    /// 创建零长度的新 inode，返回其编号。
    /// 按编号顺序取第一个无效槽位，不分配任何数据块。
    pub fn create(&mut self) -> FsResult<u32> {
        for block in 1..=self.inode_blocks {
            let cache = block_cache::get(block, self.block_device.clone());
            let mut cache = cache.lock();

            for slot in 0..INODES_PER_BLOCK {
                // 全局 0 号 inumber 永久保留
                if block == 1 && slot == 0 {
                    continue;
                }

                let offset = slot * INODE_SIZE;
                if cache.get::<DiskInode>(offset).is_valid() {
                    continue;
                }

                cache.map_mut(offset, DiskInode::init);
                drop(cache);
                block_cache::sync_all();

                return Ok(((block - 1) * INODES_PER_BLOCK + slot) as u32);
            }
        }

        warn!("create: inode table is exhausted");
        Err(FsError::OutOfInodes)
    }

    /// 删除 inode：按当前大小推算出的全部在用块归还位图，
    /// 清空指针并标记无效。块内容不抹除。
    pub fn delete(&mut self, inumber: u32) -> FsResult<()> {
        let (block, offset) = self.locate(inumber)?;

        let cache = block_cache::get(block, self.block_device.clone());
        let mut cache = cache.lock();

        if !cache.get::<DiskInode>(offset).is_valid() {
            return Err(FsError::InvalidInode);
        }

        let owned = cache.map_mut(offset, |inode: &mut DiskInode| {
            let owned = inode.clear(&self.block_device);
            inode.invalidate();
            owned
        });
        for block_id in owned {
            self.free_map.free(block_id);
        }

        drop(cache);
        block_cache::sync_all();
        Ok(())
    }

    /// inode 的逻辑大小(字节)。无效 inode 的大小读出来是 0，
    /// 与真正的空文件无从区分，这是约定行为。
    pub fn size(&self, inumber: u32) -> FsResult<u32> {
        let (block, offset) = self.locate(inumber)?;

        Ok(block_cache::get(block, self.block_device.clone())
            .lock()
            .map(offset, |inode: &DiskInode| inode.size))
    }

    /// 有效 inode 的元信息
    pub fn stat(&self, inumber: u32) -> FsResult<Stat> {
        let (block, offset) = self.locate(inumber)?;

        block_cache::get(block, self.block_device.clone())
            .lock()
            .map(offset, |inode: &DiskInode| {
                inode.is_valid().then(|| Stat {
                    inumber,
                    size: inode.size,
                    data_blocks: DiskInode::count_data_block(inode.size) as u32,
                    total_blocks: DiskInode::count_total_block(inode.size) as u32,
                })
            })
            .ok_or(FsError::InvalidInode)
    }

    /// 从 `offset` 字节处读出至多 `buf.len()` 字节，返回实际读出的字节数。
    /// 到达文件逻辑末尾即停止；读永远不会分配新块。
    pub fn read(&self, inumber: u32, buf: &mut [u8], offset: usize) -> FsResult<usize> {
        let (block, inoffset) = self.locate(inumber)?;

        let cache = block_cache::get(block, self.block_device.clone());
        let cache = cache.lock();

        let inode: &DiskInode = cache.get(inoffset);
        if !inode.is_valid() {
            return Err(FsError::InvalidInode);
        }

        Ok(inode.read_at(offset, buf, &self.block_device))
    }

    /// 从 `offset` 字节处写入 `buf`，按需分配直接块和间接块，
    /// 返回实际写入的字节数。写越过当前末尾会增长文件；
    /// 空闲块耗尽时写入就地停止，已提交的字节保持有效并计入大小。
    pub fn write(&mut self, inumber: u32, buf: &[u8], offset: usize) -> FsResult<usize> {
        let (block, inoffset) = self.locate(inumber)?;
        let Self {
            block_device,
            free_map,
            ..
        } = self;

        let cache = block_cache::get(block, block_device.clone());
        let mut cache = cache.lock();

        if !cache.get::<DiskInode>(inoffset).is_valid() {
            return Err(FsError::InvalidInode);
        }

        let written = cache.map_mut(inoffset, |inode: &mut DiskInode| {
            let want = (offset + buf.len()).min(MAX_FILE_SIZE) as u32;
            inode.grow_to(want, free_map, block_device);
            inode.write_at(offset, buf, block_device)
        });

        drop(cache);
        block_cache::sync_all();
        Ok(written)
    }

    /// 当前空闲块数量
    #[inline]
    pub fn free_blocks(&self) -> usize {
        self.free_map.free_count()
    }

    /// 诊断转储：超级块以及每个有效 inode 的大小和指针。
    /// 不要求挂载，魔数不符直接报错。
    pub fn dump(block_device: &Arc<dyn BlockDevice>) -> FsResult<String> {
        let valid = block_cache::get(0, block_device.clone())
            .lock()
            .map(0, SuperBlock::is_valid);
        if !valid {
            warn!("dump: magic number is invalid");
            return Err(FsError::NotFormatted);
        }

        Ok(Dump(block_device).to_string())
    }

    /// inode 编号换算为所在块和块内字节偏移
    fn locate(&self, inumber: u32) -> FsResult<(usize, usize)> {
        let inumber = inumber as usize;
        if inumber < 1 || inumber >= self.inode_blocks * INODES_PER_BLOCK {
            warn!("inumber {inumber} is out of range");
            return Err(FsError::BadInumber);
        }

        Ok((
            inumber / INODES_PER_BLOCK + 1,
            inumber % INODES_PER_BLOCK * INODE_SIZE,
        ))
    }
}

/// 磁盘结构的文本转储，调用方保证魔数已校验
struct Dump<'a>(&'a Arc<dyn BlockDevice>);

impl fmt::Display for Dump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let device = self.0;

        let (nblocks, ninodeblocks, ninodes) = block_cache::get(0, device.clone()).lock().map(
            0,
            |super_block: &SuperBlock| {
                (
                    super_block.nblocks,
                    super_block.ninodeblocks,
                    super_block.ninodes,
                )
            },
        );

        writeln!(f, "superblock:")?;
        writeln!(f, "    magic number is valid")?;
        writeln!(f, "    {nblocks} blocks on disk")?;
        writeln!(f, "    {ninodeblocks} blocks for inodes")?;
        writeln!(f, "    {ninodes} inodes per block")?;

        for block in 1..=ninodeblocks as usize {
            let cache = block_cache::get(block, device.clone());
            let cache = cache.lock();

            for slot in 0..INODES_PER_BLOCK {
                let inode: &DiskInode = cache.get(slot * INODE_SIZE);
                if !inode.is_valid() {
                    continue;
                }

                writeln!(f, "inode {}:", (block - 1) * INODES_PER_BLOCK + slot)?;
                writeln!(f, "    size: {} bytes", inode.size)?;

                let data_blocks = DiskInode::count_data_block(inode.size);
                write!(f, "    direct blocks:")?;
                for block_id in &inode.direct[..data_blocks.min(DIRECT_COUNT)] {
                    write!(f, " {block_id}")?;
                }
                writeln!(f)?;

                if data_blocks > DIRECT_COUNT {
                    writeln!(f, "    indirect block: {}", inode.indirect)?;

                    let entries = block_cache::get(inode.indirect as usize, device.clone())
                        .lock()
                        .map(0, |indirect: &IndirectBlock| {
                            indirect[..data_blocks - DIRECT_COUNT].to_vec()
                        });

                    write!(f, "    indirect data blocks:")?;
                    for block_id in entries {
                        write!(f, " {block_id}")?;
                    }
                    writeln!(f)?;
                }
            }
        }

        Ok(())
    }
}
