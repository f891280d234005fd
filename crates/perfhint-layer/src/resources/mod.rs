//! device 拥有的各类对象
//!
//! 所有对象都放在 [`ObjectArena`] 中，对象之间只通过 slotmap key 引用，
//! 对象被销毁后 key 失效，延迟执行时查不到对象就跳过。

pub mod buffer;
pub mod command_buffer;
pub mod descriptor_set;
pub mod event;
pub mod image;
pub mod pipeline;
pub mod queue;
pub mod render_pass;

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::ops::{Index, IndexMut};

use ash::vk;
use slotmap::{Key, SlotMap};

/// raw handle 到对象的映射
///
/// 对象存放在 `SlotMap` 中，`keys` 负责从 `vk` handle 查找 key
pub struct ObjectArena<H, K: Key, T> {
    objects: SlotMap<K, T>,
    keys: HashMap<H, K>,
}

impl<H, K: Key, T> Default for ObjectArena<H, K, T> {
    fn default() -> Self {
        Self {
            objects: SlotMap::with_key(),
            keys: HashMap::new(),
        }
    }
}

// new & init
impl<H, K, T> ObjectArena<H, K, T>
where
    H: vk::Handle + Copy + Eq + Hash + Debug,
    K: Key,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// 同一个 handle 重复注册说明拦截层漏掉了销毁调用
    pub fn insert(&mut self, handle: H, object: T) -> K {
        assert!(!self.keys.contains_key(&handle), "{:?} {handle:?} is already registered", H::TYPE);

        let key = self.objects.insert(object);
        self.keys.insert(handle, key);
        key
    }

    pub fn remove(&mut self, handle: H) -> Option<T> {
        let key = self.keys.remove(&handle)?;
        self.objects.remove(key)
    }
}

// getters
impl<H, K, T> ObjectArena<H, K, T>
where
    H: vk::Handle + Copy + Eq + Hash + Debug,
    K: Key,
{
    #[inline]
    pub fn find_key(&self, handle: H) -> Option<K> {
        self.keys.get(&handle).copied()
    }

    /// 未知的 handle 是调用方的错误
    pub fn key(&self, handle: H) -> K {
        match self.find_key(handle) {
            Some(key) => key,
            None => panic!("unknown {:?} handle {handle:?}", H::TYPE),
        }
    }

    #[inline]
    pub fn get(&self, key: K) -> Option<&T> {
        self.objects.get(key)
    }

    #[inline]
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.objects.get_mut(key)
    }

    pub fn by_handle(&self, handle: H) -> &T {
        &self.objects[self.key(handle)]
    }

    pub fn by_handle_mut(&mut self, handle: H) -> &mut T {
        let key = self.key(handle);
        &mut self.objects[key]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// 失效的 key 说明对象在仍被引用时就被销毁了
impl<H, K: Key, T> Index<K> for ObjectArena<H, K, T> {
    type Output = T;

    fn index(&self, key: K) -> &T {
        &self.objects[key]
    }
}

impl<H, K: Key, T> IndexMut<K> for ObjectArena<H, K, T> {
    fn index_mut(&mut self, key: K) -> &mut T {
        &mut self.objects[key]
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;
    use crate::handles::EventKey;

    #[test]
    fn test_arena_insert_remove() {
        let mut arena: ObjectArena<vk::Event, EventKey, u32> = ObjectArena::new();
        let event = vk::Event::from_raw(7);

        let key = arena.insert(event, 1);
        assert_eq!(arena.find_key(event), Some(key));
        assert_eq!(*arena.by_handle(event), 1);

        *arena.by_handle_mut(event) = 2;
        assert_eq!(arena.get(key), Some(&2));

        assert_eq!(arena.remove(event), Some(2));
        assert!(arena.get(key).is_none());
        assert!(arena.find_key(event).is_none());
        assert!(arena.is_empty());
    }

    #[test]
    #[should_panic(expected = "unknown")]
    fn test_unknown_handle() {
        let arena: ObjectArena<vk::Event, EventKey, u32> = ObjectArena::new();
        arena.key(vk::Event::from_raw(1));
    }
}
