//! Модуль ограниченного кэша
//!
//! Кэш фиксированной ёмкости с вытеснением в порядке вставки (FIFO).
//! Используется для словарных статей и аудио произношений.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Ограниченное ассоциативное хранилище
pub trait BoundedCache<K, V> {
    /// Получить значение по ключу
    fn get(&self, key: &K) -> Option<&V>;

    /// Добавить значение. Возвращает вытесненную пару, если ёмкость превышена.
    fn insert(&mut self, key: K, value: V) -> Option<(K, V)>;

    /// Удалить значение по ключу
    fn remove(&mut self, key: &K) -> Option<V>;

    /// Очистить кэш
    fn clear(&mut self);

    /// Количество элементов
    fn len(&self) -> usize;

    /// Максимальное количество элементов
    fn capacity(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Кэш с вытеснением самого старого по вставке элемента.
///
/// Чтение не обновляет порядок: это не LRU.
#[derive(Debug, Clone)]
pub struct FifoCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V> FifoCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Все значения в порядке вставки
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.order.iter().filter_map(|key| self.entries.get(key))
    }

    /// Удалить все элементы, не прошедшие проверку
    pub fn retain(&mut self, mut keep: impl FnMut(&K, &V) -> bool) -> Vec<(K, V)> {
        let mut removed = Vec::new();
        let keys: Vec<K> = self.order.iter().cloned().collect();
        for key in keys {
            let drop_it = match self.entries.get(&key) {
                Some(value) => !keep(&key, value),
                None => false,
            };
            if drop_it {
                if let Some(value) = self.remove(&key) {
                    removed.push((key, value));
                }
            }
        }
        removed
    }
}

impl<K: Eq + Hash + Clone, V> BoundedCache<K, V> for FifoCache<K, V> {
    fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        // Замена существующего ключа не меняет его позицию в очереди
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return None;
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                evicted = self.entries.remove(&oldest).map(|v| (oldest, v));
            }
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, value);
        evicted
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(value)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}
