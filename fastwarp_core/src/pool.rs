//! A pool of reusable scratch buffers.
//!
//! Buffers are checked out as [`PooledBuffer`] and go back to the pool when the
//! guard is dropped, so every early return releases them.

use parking_lot::Mutex;
use std::{
	fmt::Debug,
	ops::{Deref, DerefMut},
	sync::Arc,
};

#[derive(Debug)]
struct PoolInner {
	idle: Mutex<Vec<Vec<u8>>>,
	max_idle: usize,
}

/// Shared pool of byte buffers. Cloning yields another handle to the same pool.
#[derive(Clone, Debug)]
pub struct BufferPool {
	inner: Arc<PoolInner>,
}

impl BufferPool {
	pub fn new(max_idle: usize) -> Self {
		BufferPool {
			inner: Arc::new(PoolInner {
				idle: Mutex::new(Vec::new()),
				max_idle,
			}),
		}
	}

	/// Checks out a zeroed buffer of exactly `size` bytes.
	pub fn acquire(&self, size: usize) -> PooledBuffer {
		let reused = self.inner.idle.lock().pop();
		let buffer = match reused {
			Some(mut buffer) => {
				buffer.clear();
				buffer.resize(size, 0);
				buffer
			}
			None => {
				log::trace!("allocating scratch buffer of {size} bytes");
				vec![0u8; size]
			}
		};
		PooledBuffer {
			buffer,
			pool: self.inner.clone(),
		}
	}

	/// Number of buffers waiting for reuse.
	pub fn idle_count(&self) -> usize {
		self.inner.idle.lock().len()
	}
}

impl Default for BufferPool {
	fn default() -> Self {
		BufferPool::new(64)
	}
}

/// A buffer checked out from a [`BufferPool`].
pub struct PooledBuffer {
	buffer: Vec<u8>,
	pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
	type Target = [u8];

	fn deref(&self) -> &[u8] {
		&self.buffer
	}
}

impl DerefMut for PooledBuffer {
	fn deref_mut(&mut self) -> &mut [u8] {
		&mut self.buffer
	}
}

impl Drop for PooledBuffer {
	fn drop(&mut self) {
		let buffer = std::mem::take(&mut self.buffer);
		let mut idle = self.pool.idle.lock();
		if idle.len() < self.pool.max_idle {
			idle.push(buffer);
		}
	}
}

impl Debug for PooledBuffer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "PooledBuffer({} bytes)", self.buffer.len())
	}
}
