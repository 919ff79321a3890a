use crate::MAGIC;

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 记录卷的整体几何
#[derive(Debug)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// 卷占据的总块数
    pub nblocks: u32,
    /// inode 表占据的块数
    pub ninodeblocks: u32,
    /// 每块容纳的 inode 个数
    pub ninodes: u32,
}

impl SuperBlock {
    #[inline]
    pub fn init(&mut self, nblocks: u32, ninodeblocks: u32, ninodes: u32) {
        *self = Self {
            magic: MAGIC,
            nblocks,
            ninodeblocks,
            ninodes,
        };
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }
}
