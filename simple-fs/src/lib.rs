#![no_std]

extern crate alloc;

/* simple-fs 的整体架构，自上而下 */

// 文件系统管理层：格式化、挂载，以及按 inode 编号的增删读写
mod fs;

// 空闲块分配层：挂载时扫描磁盘重建的内存位图
mod free_map;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓存层：内存上的磁盘块数据缓存
mod block_cache;

// 错误类型
mod error;

pub use self::{
    error::{FsError, FsResult},
    fs::{SimpleFileSystem, Stat},
    layout::{DIRECT_COUNT, INODES_PER_BLOCK, MAX_FILE_SIZE, POINTERS_PER_BLOCK},
};
pub use block_dev::BlockDevice;

pub const MAGIC: u32 = 0xf0f0_3410;
pub const BLOCK_SIZE: usize = 4096;

type DataBlock = [u8; BLOCK_SIZE];
