use std::sync::{Arc, Mutex};

use block_dev::BlockDevice;
use simple_fs::{BLOCK_SIZE, DIRECT_COUNT, FsError, SimpleFileSystem};

use crate::BlockFile;

fn device(blocks: usize) -> Arc<dyn BlockDevice> {
    let file = tempfile::tempfile().unwrap();
    file.set_len((blocks * BLOCK_SIZE) as u64).unwrap();
    Arc::new(BlockFile(Mutex::new(file)))
}

fn formatted(blocks: usize) -> (Arc<dyn BlockDevice>, SimpleFileSystem) {
    let device = device(blocks);
    SimpleFileSystem::format(&device).unwrap();
    let fs = SimpleFileSystem::mount(device.clone()).unwrap();
    (device, fs)
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

fn inode_table_blocks(blocks: usize) -> usize {
    blocks / 10 + 1
}

#[test]
fn mount_rejects_unformatted() {
    let device = device(16);
    assert_eq!(
        SimpleFileSystem::mount(device).err(),
        Some(FsError::NotFormatted)
    );
}

#[test]
fn format_rejects_tiny_device() {
    let device = device(2);
    assert_eq!(
        SimpleFileSystem::format(&device).err(),
        Some(FsError::TooFewBlocks)
    );
}

#[test]
fn format_reserves_metadata_blocks() {
    for blocks in [10, 16, 64] {
        let (_, fs) = formatted(blocks);
        // 超级块和 inode 表在用，其余全部空闲
        assert_eq!(fs.free_blocks(), blocks - 1 - inode_table_blocks(blocks));
    }
}

#[test]
fn create_starts_empty() {
    let (_, mut fs) = formatted(16);

    let inumber = fs.create().unwrap();
    assert_eq!(inumber, 1);
    assert_eq!(fs.size(inumber), Ok(0));

    let stat = fs.stat(inumber).unwrap();
    assert_eq!(stat.size, 0);
    assert_eq!(stat.data_blocks, 0);
    assert_eq!(stat.total_blocks, 0);

    // 创建零长度文件不占数据块
    assert_eq!(fs.free_blocks(), 16 - 1 - inode_table_blocks(16));
}

#[test]
fn inumber_range_is_checked() {
    let (_, mut fs) = formatted(16);

    assert_eq!(fs.size(0), Err(FsError::BadInumber));
    assert_eq!(fs.size(u32::MAX), Err(FsError::BadInumber));
    assert_eq!(fs.delete(0), Err(FsError::BadInumber));
    assert_eq!(fs.read(9999, &mut [0; 8], 0), Err(FsError::BadInumber));
    assert_eq!(fs.write(9999, &[0; 8], 0), Err(FsError::BadInumber));
}

#[test]
fn write_read_round_trip_at_offset() {
    let (_, mut fs) = formatted(64);
    let inumber = fs.create().unwrap();

    let data = pattern(5000, 7);
    assert_eq!(fs.write(inumber, &data, 100), Ok(5000));
    assert_eq!(fs.size(inumber), Ok(5100));

    let mut buf = vec![0; 5000];
    assert_eq!(fs.read(inumber, &mut buf, 100), Ok(5000));
    assert_eq!(buf, data);
}

#[test]
fn write_spans_block_boundary() {
    let (_, mut fs) = formatted(64);
    let inumber = fs.create().unwrap();

    let len = BLOCK_SIZE * 3 / 2;
    let data = pattern(len, 3);
    assert_eq!(fs.write(inumber, &data, 0), Ok(len));
    assert_eq!(fs.size(inumber), Ok(len as u32));

    let mut buf = vec![0; len];
    assert_eq!(fs.read(inumber, &mut buf, 0), Ok(len));
    assert_eq!(buf, data);
}

#[test]
fn read_stops_at_logical_end() {
    let (_, mut fs) = formatted(16);
    let inumber = fs.create().unwrap();

    let data = pattern(1000, 1);
    fs.write(inumber, &data, 0).unwrap();

    // 读请求超过文件大小，只能读到末尾
    let mut buf = vec![0xff; 2000];
    assert_eq!(fs.read(inumber, &mut buf, 0), Ok(1000));
    assert_eq!(&buf[..1000], &data[..]);

    // 偏移在末尾之后，读不到任何字节
    assert_eq!(fs.read(inumber, &mut buf, 1000), Ok(0));
    assert_eq!(fs.read(inumber, &mut buf, 5000), Ok(0));
}

#[test]
fn write_past_end_extends_file() {
    let (_, mut fs) = formatted(64);
    let inumber = fs.create().unwrap();

    let data = pattern(100, 9);
    let offset = BLOCK_SIZE * 2;
    assert_eq!(fs.write(inumber, &data, offset), Ok(100));
    assert_eq!(fs.size(inumber), Ok((offset + 100) as u32));

    // 空洞部分落在格式化清零过的块上
    let mut hole = vec![0xff; BLOCK_SIZE];
    assert_eq!(fs.read(inumber, &mut hole, 0), Ok(BLOCK_SIZE));
    assert!(hole.iter().all(|&b| b == 0));

    let mut buf = vec![0; 100];
    assert_eq!(fs.read(inumber, &mut buf, offset), Ok(100));
    assert_eq!(buf, data);
}

#[test]
fn indirect_spill() {
    let blocks = 64;
    let (_, mut fs) = formatted(blocks);
    let baseline = fs.free_blocks();
    let inumber = fs.create().unwrap();

    // 7 个数据块，超出 5 个直接指针，带上间接索引块共 8 块
    let len = (DIRECT_COUNT + 2) * BLOCK_SIZE;
    let data = pattern(len, 5);
    assert_eq!(fs.write(inumber, &data, 0), Ok(len));
    assert_eq!(fs.size(inumber), Ok(len as u32));

    let stat = fs.stat(inumber).unwrap();
    assert_eq!(stat.data_blocks as usize, DIRECT_COUNT + 2);
    assert_eq!(stat.total_blocks as usize, DIRECT_COUNT + 3);
    assert_eq!(fs.free_blocks(), baseline - DIRECT_COUNT - 3);

    let mut buf = vec![0; len];
    assert_eq!(fs.read(inumber, &mut buf, 0), Ok(len));
    assert_eq!(buf, data);
}

#[test]
fn delete_then_reuse() {
    let (_, mut fs) = formatted(64);
    let baseline = fs.free_blocks();

    let inumber = fs.create().unwrap();
    let data = pattern((DIRECT_COUNT + 2) * BLOCK_SIZE, 2);
    fs.write(inumber, &data, 0).unwrap();
    assert!(fs.free_blocks() < baseline);

    fs.delete(inumber).unwrap();

    // 全部在用块都还给了位图
    assert_eq!(fs.free_blocks(), baseline);
    // 已删除 inode 的大小读出来是 0
    assert_eq!(fs.size(inumber), Ok(0));
    // 读写无效 inode 都失败
    assert_eq!(
        fs.read(inumber, &mut [0; 8], 0),
        Err(FsError::InvalidInode)
    );
    assert_eq!(fs.write(inumber, &[0; 8], 0), Err(FsError::InvalidInode));
    assert_eq!(fs.delete(inumber), Err(FsError::InvalidInode));
    assert_eq!(fs.stat(inumber), Err(FsError::InvalidInode));

    // 编号可以复用
    assert_eq!(fs.create().unwrap(), inumber);
}

#[test]
fn write_stops_on_exhaustion() {
    let blocks = 16;
    let (_, mut fs) = formatted(blocks);
    let inumber = fs.create().unwrap();

    // 13 个空闲块 = 12 个数据块 + 1 个间接索引块
    let data_cap = fs.free_blocks() - 1;
    let data = pattern((data_cap + 2) * BLOCK_SIZE, 11);

    let written = fs.write(inumber, &data, 0).unwrap();
    assert_eq!(written, data_cap * BLOCK_SIZE);
    assert_eq!(fs.size(inumber), Ok(written as u32));
    assert_eq!(fs.free_blocks(), 0);

    // 已提交的字节保持可读
    let mut buf = vec![0; written];
    assert_eq!(fs.read(inumber, &mut buf, 0), Ok(written));
    assert_eq!(buf, &data[..written]);

    // 没有空闲块时继续追加写不进任何字节
    assert_eq!(fs.write(inumber, &[1; 100], written), Ok(0));
    assert_eq!(fs.size(inumber), Ok(written as u32));
}

#[test]
fn inode_table_exhaustion() {
    let (_, mut fs) = formatted(10);

    // 两个 inode 表块共 256 个槽位，全局 0 号保留
    for expect in 1..256 {
        assert_eq!(fs.create().unwrap(), expect);
    }
    assert_eq!(fs.create(), Err(FsError::OutOfInodes));

    // 删掉一个就又能创建了
    fs.delete(42).unwrap();
    assert_eq!(fs.create().unwrap(), 42);
}

#[test]
fn free_map_survives_remount() {
    let (device, mut fs) = formatted(64);

    let a = fs.create().unwrap();
    let b = fs.create().unwrap();
    let data_a = pattern((DIRECT_COUNT + 2) * BLOCK_SIZE, 21);
    let data_b = pattern(3000, 22);
    fs.write(a, &data_a, 0).unwrap();
    fs.write(b, &data_b, BLOCK_SIZE).unwrap();
    fs.delete(b).unwrap();
    let census = fs.free_blocks();
    fs.unmount();

    // 重新挂载扫描出的位图与增量维护的一致
    let fs = SimpleFileSystem::mount(device).unwrap();
    assert_eq!(fs.free_blocks(), census);
    assert_eq!(fs.size(a), Ok(data_a.len() as u32));

    let mut buf = vec![0; data_a.len()];
    assert_eq!(fs.read(a, &mut buf, 0), Ok(data_a.len()));
    assert_eq!(buf, data_a);
}

#[test]
fn format_is_idempotent() {
    let (device, fs) = formatted(32);
    fs.unmount();

    SimpleFileSystem::format(&device).unwrap();
    let fs = SimpleFileSystem::mount(device).unwrap();
    assert_eq!(fs.free_blocks(), 32 - 1 - inode_table_blocks(32));
}

#[test]
fn dump_shows_superblock_and_inodes() {
    let (dev, mut fs) = formatted(16);
    let inumber = fs.create().unwrap();
    fs.write(inumber, &pattern(BLOCK_SIZE + 1, 4), 0).unwrap();

    let dump = SimpleFileSystem::dump(&dev).unwrap();
    assert!(dump.contains("superblock:"));
    assert!(dump.contains("16 blocks on disk"));
    assert!(dump.contains("2 blocks for inodes"));
    assert!(dump.contains("inode 1:"));
    assert!(dump.contains(&format!("size: {} bytes", BLOCK_SIZE + 1)));
    assert!(dump.contains("direct blocks: 3 4"));

    let unformatted = self::device(4);
    assert_eq!(
        SimpleFileSystem::dump(&unformatted).err(),
        Some(FsError::NotFormatted)
    );
}
