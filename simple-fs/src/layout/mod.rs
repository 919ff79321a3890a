//! # 磁盘数据结构层
//!
//! 磁盘布局：
//! 超级块(块0) | inode 表(块 1..=ninodeblocks) | 数据块
//!
//! 数据块或存放文件内容，或被某个 inode 的间接指针
//! 引用而存放块编号数组。

mod super_block;
pub use super_block::SuperBlock;

mod inode;
pub use inode::{DIRECT_COUNT, DiskInode, INODES_PER_BLOCK, MAX_FILE_SIZE, POINTERS_PER_BLOCK};
pub(crate) use inode::{INODE_SIZE, IndirectBlock};
