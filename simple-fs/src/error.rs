use core::fmt;

pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// 超级块魔数不匹配，卷未格式化或已损坏
    NotFormatted,
    /// 设备太小，放不下 inode 表和至少一个数据块
    TooFewBlocks,
    /// inode 表已满
    OutOfInodes,
    /// inode 编号越界
    BadInumber,
    /// inode 未创建或已删除
    InvalidInode,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::NotFormatted => "magic number is invalid",
            Self::TooFewBlocks => "device is too small to format",
            Self::OutOfInodes => "inode table is full",
            Self::BadInumber => "inumber is out of range",
            Self::InvalidInode => "inode is not valid",
        };
        f.write_str(msg)
    }
}
