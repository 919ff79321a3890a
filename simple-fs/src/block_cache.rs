//! # 块缓存层
//!
//! 操作磁盘数据结构之前，先把所在块复制到内存缓冲区，
//! 读写都在缓冲区中进行；脏块在换出或显式同步时写回设备。
//!
//! 缓存项以 **(设备, 块ID)** 为键，同一进程内可以同时操作多个卷。
//! 每个修改磁盘的文件系统操作结束时都会调用 [`sync_all`]，
//! 因此缓存不会改变"设备同步可靠"这一假设下的可见结果。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use block_dev::BlockDevice;
use spin::Mutex;

use crate::BLOCK_SIZE;

static BLOCK_CACHE_MANAGER: Mutex<BlockCacheManager> = Mutex::new(BlockCacheManager::new());

/// 缓存项的键：设备标识 + 块ID
type CacheKey = (usize, usize);

struct BlockCacheManager {
    queue: Vec<(CacheKey, Arc<Mutex<BlockCache>>)>,
}

#[inline]
pub fn get(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Arc<Mutex<BlockCache>> {
    BLOCK_CACHE_MANAGER.lock().get(block_id, block_device)
}

/// 把所有脏块写回设备
pub fn sync_all() {
    BLOCK_CACHE_MANAGER
        .lock()
        .queue
        .iter()
        .for_each(|(_, cache)| cache.lock().sync());
}

/// 内存中的块缓存
pub struct BlockCache {
    data: [u8; BLOCK_SIZE],
    block_id: usize,
    block_device: Arc<dyn BlockDevice>,
    modified: bool,
}

impl BlockCache {
    pub fn new(block_id: usize, block_device: Arc<dyn BlockDevice>) -> Self {
        let mut data = [0; BLOCK_SIZE];
        block_device.read_block(block_id, &mut data);

        Self {
            data,
            block_id,
            block_device,
            modified: false,
        }
    }

    pub fn sync(&mut self) {
        if self.modified {
            self.modified = false;
            self.block_device.write_block(self.block_id, &self.data);
        }
    }

    /// 把块内偏移处的数据解释为 `T`
    pub fn get<T: Sized>(&self, offset: usize) -> &T {
        assert!(mem::size_of::<T>() + offset <= BLOCK_SIZE);
        let addr = self.offset(offset).cast();
        unsafe { &*addr }
    }

    pub fn get_mut<T: Sized>(&mut self, offset: usize) -> &mut T {
        assert!(mem::size_of::<T>() + offset <= BLOCK_SIZE);
        self.modified = true;
        let addr = self.offset(offset).cast_mut().cast();
        unsafe { &mut *addr }
    }

    #[inline]
    pub fn map<T: Sized, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Sized, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }

    #[inline]
    fn offset(&self, count: usize) -> *const u8 {
        &self.data[count]
    }
}

impl Drop for BlockCache {
    fn drop(&mut self) {
        self.sync();
    }
}

impl BlockCacheManager {
    /// 块缓存个数的上限。多个卷共用一个缓存池，
    /// 上限按可能并存的卷数放宽
    const CAPACITY: usize = 64;

    const fn new() -> Self {
        Self { queue: Vec::new() }
    }

    // 调度策略：触及上限时踢走一个闲置块
    fn get(
        &mut self,
        block_id: usize,
        block_device: Arc<dyn BlockDevice>,
    ) -> Arc<Mutex<BlockCache>> {
        let key = (Arc::as_ptr(&block_device).cast::<u8>() as usize, block_id);

        if let Some(cache) = self
            .queue
            .iter()
            .find_map(|(k, cache)| (key == *k).then_some(cache))
        {
            return Arc::clone(cache);
        }

        if self.queue.len() == Self::CAPACITY {
            let index = self
                .queue
                .iter()
                .position(|(_, cache)| Arc::strong_count(cache) == 1) // 没有其它引用的才能换出
                .expect("run out of block cache");
            self.queue.remove(index);
        }

        let block_cache = Arc::new(Mutex::new(BlockCache::new(block_id, block_device)));
        self.queue.push((key, block_cache.clone()));

        block_cache
    }
}
