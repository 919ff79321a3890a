//! # 块设备接口层
//!
//! 块设备以**块**为单位存储数据，块大小固定，以 0..N-1 编号；
//! [`BlockDevice`] 就是对这类设备读写能力的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! 文件系统不直接操作存储介质，只通过块设备驱动读写。

#![no_std]

/// 块设备驱动特质
///
/// 设备被假定为同步且可靠的：读写调用返回即完成。
pub trait BlockDevice: Send + Sync {
    fn read_block(&self, block_id: usize, buf: &mut [u8]);
    fn write_block(&self, block_id: usize, buf: &[u8]);
    /// 设备总块数
    fn block_count(&self) -> usize;
}
