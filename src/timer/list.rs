//! # Lista Ordenada de Timers
//! src/timer/list.rs
//!
//! Lista doblemente enlazada, ordenada por deadline ascendente, con head y
//! tail. Los nodos viven en un arena (`Vec`) y se enlazan por índice; cada
//! `TimerId` lleva una generación, así un id viejo nunca toca un nodo que
//! ya fue reutilizado.
//!
//! | Operación | Costo |
//! |-----------|-------|
//! | `add`     | O(n) peor caso, recorre desde el head |
//! | `adjust`  | O(n) peor caso, recorre desde la posición vieja |
//! | `delete`  | O(1) |
//! | `tick`    | O(k) para k timers vencidos |
//!
//! Invariante: para todo par de nodos adyacentes `a -> b`,
//! `a.expire <= b.expire`. Timers con el mismo deadline quedan en orden de
//! llegada.

use std::time::Instant;

/// Identificador estable de un timer registrado
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    index: usize,
    generation: u64,
}

struct Node<T> {
    expire: Instant,
    data: T,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Entry<T> {
    generation: u64,
    node: Option<Node<T>>,
}

/// Lista de timers ordenada por deadline
pub struct TimerList<T> {
    entries: Vec<Entry<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> TimerList<T> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Registra un timer que vence en `expire`
    pub fn add(&mut self, expire: Instant, data: T) -> TimerId {
        let node = Node {
            expire,
            data,
            prev: None,
            next: None,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.entries[index].node = Some(node);
                index
            }
            None => {
                self.entries.push(Entry {
                    generation: 0,
                    node: Some(node),
                });
                self.entries.len() - 1
            }
        };
        self.len += 1;

        match self.head {
            None => {
                self.head = Some(index);
                self.tail = Some(index);
            }
            Some(head) if expire < self.node(head).expire => self.push_front(index),
            Some(head) => self.insert_from(index, head),
        }

        TimerId {
            index,
            generation: self.entries[index].generation,
        }
    }

    /// Mueve un timer a su nuevo deadline
    ///
    /// Retorna `false` si el id ya no está registrado.
    pub fn adjust(&mut self, id: TimerId, expire: Instant) -> bool {
        if !self.contains(id) {
            return false;
        }

        let index = id.index;
        let (old, prev, next) = {
            let node = self.node_mut(index);
            let old = node.expire;
            node.expire = expire;
            (old, node.prev, node.next)
        };

        if expire >= old {
            // Extensión del deadline: solo puede moverse hacia el tail
            match next {
                Some(next) if self.node(next).expire < expire => {
                    self.unlink(index);
                    self.insert_from(index, next);
                }
                _ => {}
            }
        } else {
            // Adelanto: solo puede moverse hacia el head
            match prev {
                Some(prev) if self.node(prev).expire > expire => {
                    self.unlink(index);
                    match self.head {
                        Some(head) if expire >= self.node(head).expire => {
                            self.insert_from(index, head)
                        }
                        _ => self.push_front(index),
                    }
                }
                _ => {}
            }
        }
        true
    }

    /// Quita un timer de la lista y devuelve su dato
    pub fn delete(&mut self, id: TimerId) -> Option<T> {
        if !self.contains(id) {
            return None;
        }
        self.unlink(id.index);
        Some(self.release(id.index).data)
    }

    /// Dispara todos los timers vencidos a `now`, en orden de deadline.
    ///
    /// Se detiene en el primer timer no vencido: por el orden de la lista
    /// ninguno posterior puede estar vencido. Retorna cuántos disparó.
    pub fn tick<F>(&mut self, now: Instant, mut on_expire: F) -> usize
    where
        F: FnMut(TimerId, T),
    {
        let mut fired = 0;
        while let Some(head) = self.head {
            if now < self.node(head).expire {
                break;
            }
            let id = TimerId {
                index: head,
                generation: self.entries[head].generation,
            };
            self.unlink(head);
            let node = self.release(head);
            on_expire(id, node.data);
            fired += 1;
        }
        fired
    }

    /// Verifica si el id sigue registrado
    pub fn contains(&self, id: TimerId) -> bool {
        self.entries
            .get(id.index)
            .map(|e| e.generation == id.generation && e.node.is_some())
            .unwrap_or(false)
    }

    /// Dato asociado a un timer registrado
    pub fn get(&self, id: TimerId) -> Option<&T> {
        if !self.contains(id) {
            return None;
        }
        Some(&self.node(id.index).data)
    }

    /// Deadline más próximo
    pub fn next_expiry(&self) -> Option<Instant> {
        self.head.map(|head| self.node(head).expire)
    }

    /// Deadlines en el orden de la lista (head → tail)
    pub fn deadlines(&self) -> Vec<Instant> {
        let mut out = Vec::with_capacity(self.len);
        let mut cur = self.head;
        while let Some(index) = cur {
            let node = self.node(index);
            out.push(node.expire);
            cur = node.next;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Libera todos los timers pendientes
    pub fn clear(&mut self) {
        let mut cur = self.head;
        while let Some(index) = cur {
            cur = self.node(index).next;
            self.release(index);
        }
        self.head = None;
        self.tail = None;
    }

    // === Cirugía de enlaces ===

    fn node(&self, index: usize) -> &Node<T> {
        match &self.entries[index].node {
            Some(node) => node,
            None => unreachable!("timer index {} is not linked", index),
        }
    }

    fn node_mut(&mut self, index: usize) -> &mut Node<T> {
        match &mut self.entries[index].node {
            Some(node) => node,
            None => unreachable!("timer index {} is not linked", index),
        }
    }

    /// Libera el slot del arena e invalida los ids que apuntaban a él
    fn release(&mut self, index: usize) -> Node<T> {
        let entry = &mut self.entries[index];
        let node = match entry.node.take() {
            Some(node) => node,
            None => unreachable!("timer index {} released twice", index),
        };
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;
        node
    }

    fn push_front(&mut self, index: usize) {
        let old_head = self.head;
        {
            let node = self.node_mut(index);
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(head) => self.node_mut(head).prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    /// Inserta `index` en algún lugar después de `anchor`.
    ///
    /// Requiere `anchor.expire <= expire` del nodo a insertar.
    fn insert_from(&mut self, index: usize, anchor: usize) {
        let expire = self.node(index).expire;
        let mut prev = anchor;
        let mut cur = self.node(anchor).next;

        while let Some(next) = cur {
            if expire < self.node(next).expire {
                break;
            }
            prev = next;
            cur = self.node(next).next;
        }

        {
            let node = self.node_mut(index);
            node.prev = Some(prev);
            node.next = cur;
        }
        self.node_mut(prev).next = Some(index);
        match cur {
            Some(next) => self.node_mut(next).prev = Some(index),
            None => self.tail = Some(index),
        }
    }

    /// Saca `index` de la cadena, cubriendo head, tail y medio
    fn unlink(&mut self, index: usize) {
        let (prev, next) = {
            let node = self.node_mut(index);
            let links = (node.prev, node.next);
            node.prev = None;
            node.next = None;
            links
        };

        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
    }
}

impl<T> Default for TimerList<T> {
    fn default() -> Self {
        Self::new()
    }
}
