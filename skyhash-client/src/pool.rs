// SPDX-License-Identifier: MIT

//! Bounded connection pool with idle reaping, max-age retirement and
//! warm-up to a minimum idle count.
//!
//! Capacity is enforced by a semaphore of `pool_size` permits: a permit
//! is held for as long as a connection is checked out, so the number of
//! live sockets can never exceed the configured bound. Checked-in
//! connections wait in a deque handed out LIFO (or FIFO when configured)
//! and are closed when they sit idle too long or outlive the age limit.

use crate::conn::Conn;
use crate::error::Error;
use crate::options::{Dialer, Options};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace, warn};

/// Snapshot of the pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Checkouts served from the idle deque.
    pub hits: u32,
    /// Checkouts that had to dial.
    pub misses: u32,
    /// Checkouts that gave up waiting for a permit.
    pub timeouts: u32,
    /// Live connections, checked out or idle.
    pub total_conns: u32,
    /// Connections currently idle in the deque.
    pub idle_conns: u32,
    /// Connections closed because they went stale.
    pub stale_conns: u32,
}

pub(crate) struct ConnPool {
    opt: Arc<Options>,
    dialer: Dialer,
    semaphore: Arc<Semaphore>,
    idle: Mutex<VecDeque<Conn>>,
    closed: AtomicBool,
    reaper_shutdown: Arc<Notify>,

    hits: AtomicU32,
    misses: AtomicU32,
    timeouts: AtomicU32,
    stale: AtomicU32,
    total: AtomicU32,
    idle_len: AtomicU32,
}

impl ConnPool {
    /// Builds the pool, pre-dials up to `min_idle_conns` connections and
    /// starts the reaper. Must run inside a tokio runtime.
    pub(crate) fn new(opt: Arc<Options>) -> Arc<ConnPool> {
        let pool = Arc::new(ConnPool {
            dialer: opt.dialer(),
            semaphore: Arc::new(Semaphore::new(opt.pool_size())),
            idle: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            reaper_shutdown: Arc::new(Notify::new()),
            hits: AtomicU32::new(0),
            misses: AtomicU32::new(0),
            timeouts: AtomicU32::new(0),
            stale: AtomicU32::new(0),
            total: AtomicU32::new(0),
            idle_len: AtomicU32::new(0),
            opt,
        });
        pool.check_min_idle();
        pool.spawn_reaper();
        pool
    }

    /// Checks out a connection: a permit within `pool_timeout`, then an
    /// idle connection (discarding stale ones) or a fresh dial.
    pub(crate) async fn get(self: &Arc<Self>) -> Result<PooledConn, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let start = Instant::now();
        let permit = self.acquire_permit().await?;

        while let Some(conn) = self.pop_idle() {
            if self.is_stale(&conn) {
                self.drop_stale(conn);
                continue;
            }
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.observe_acquire("reused", start);
            trace!("reusing idle connection");
            return Ok(PooledConn::new(conn, permit, self));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        match self.dial_conn().await {
            Ok(conn) => {
                self.total.fetch_add(1, Ordering::Relaxed);
                self.observe_acquire("created", start);
                if let Some(m) = &self.opt.pool_metrics {
                    m.connections_created.with_label_values(&["success"]).inc();
                }
                debug!("created new connection");
                Ok(PooledConn::new(conn, permit, self))
            }
            Err(err) => {
                if let Some(m) = &self.opt.pool_metrics {
                    m.connections_created.with_label_values(&["error"]).inc();
                    m.connection_errors
                        .with_label_values(&["creation_failed"])
                        .inc();
                }
                warn!("failed to dial connection: {err}");
                Err(err)
            }
        }
    }

    /// Checks a connection back in. Dropped instead if the pool closed
    /// while it was out.
    pub(crate) fn put(&self, mut pc: PooledConn) {
        let Some(conn) = pc.conn.take() else { return };
        if self.is_closed() {
            self.total.fetch_sub(1, Ordering::Relaxed);
            return;
        }
        self.push_idle(conn);
        self.update_gauges();
    }

    /// Closes a connection whose state is unknown and frees its slot.
    pub(crate) fn remove(self: &Arc<Self>, mut pc: PooledConn) {
        if pc.conn.take().is_some() {
            self.total.fetch_sub(1, Ordering::Relaxed);
            if let Some(m) = &self.opt.pool_metrics {
                m.connection_errors.with_label_values(&["broken"]).inc();
            }
            self.update_gauges();
            self.check_min_idle();
        }
    }

    /// Closes the pool. Only the first call takes effect; later calls
    /// return `Ok` without doing anything.
    pub(crate) fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.reaper_shutdown.notify_waiters();
        self.semaphore.close();

        let drained: Vec<Conn> = {
            let mut idle = self.idle.lock().expect("pool mutex poisoned");
            idle.drain(..).collect()
        };
        self.idle_len.store(0, Ordering::Relaxed);
        self.total
            .fetch_sub(drained.len() as u32, Ordering::Relaxed);
        drop(drained);
        self.update_gauges();
        debug!("connection pool closed");
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            total_conns: self.total.load(Ordering::Relaxed),
            idle_conns: self.idle_len.load(Ordering::Relaxed),
            stale_conns: self.stale.load(Ordering::Relaxed),
        }
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, Error> {
        let acquire = self.semaphore.clone().acquire_owned();
        match tokio::time::timeout(self.opt.pool_wait(), acquire).await {
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                if let Some(m) = &self.opt.pool_metrics {
                    m.connection_errors.with_label_values(&["timeout"]).inc();
                }
                Err(Error::PoolTimeout)
            }
            Ok(Err(_)) => Err(Error::Closed),
            Ok(Ok(permit)) => Ok(permit),
        }
    }

    async fn dial_conn(&self) -> Result<Conn, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let stream = (self.dialer)(&self.opt.network, &self.opt.addr).await?;
        Ok(Conn::new(stream))
    }

    fn pop_idle(&self) -> Option<Conn> {
        let mut idle = self.idle.lock().expect("pool mutex poisoned");
        let conn = if self.opt.pool_fifo {
            idle.pop_front()
        } else {
            idle.pop_back()
        };
        if conn.is_some() {
            self.idle_len.fetch_sub(1, Ordering::Relaxed);
        }
        conn
    }

    fn push_idle(&self, conn: Conn) {
        let mut idle = self.idle.lock().expect("pool mutex poisoned");
        idle.push_back(conn);
        self.idle_len.fetch_add(1, Ordering::Relaxed);
    }

    fn is_stale(&self, conn: &Conn) -> bool {
        if let Some(idle_limit) = self.opt.idle_deadline() {
            if conn.idle_for() >= idle_limit {
                return true;
            }
        }
        if let Some(age_limit) = self.opt.conn_age_limit() {
            if conn.age() >= age_limit {
                return true;
            }
        }
        false
    }

    fn drop_stale(&self, conn: Conn) {
        self.stale.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_sub(1, Ordering::Relaxed);
        trace!("discarding stale connection");
        drop(conn);
    }

    /// Tops the idle deque back up to `min_idle_conns`, dialing in the
    /// background. Capacity reservations go through `total` so warm-up
    /// can never push the pool past `pool_size`.
    fn check_min_idle(self: &Arc<Self>) {
        if self.opt.min_idle_conns == 0 || self.is_closed() {
            return;
        }
        let pool_size = self.opt.pool_size() as u32;
        let min_idle = self.opt.min_idle_conns as u32;
        loop {
            let total = self.total.load(Ordering::Relaxed);
            if self.idle_len.load(Ordering::Relaxed) >= min_idle || total >= pool_size {
                return;
            }
            if self
                .total
                .compare_exchange(total, total + 1, Ordering::Relaxed, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            // The idle slot is counted up front so concurrent top-ups
            // don't dial past the target while this one is in flight.
            self.idle_len.fetch_add(1, Ordering::Relaxed);
            let pool = Arc::clone(self);
            tokio::spawn(async move {
                match pool.dial_conn().await {
                    Ok(conn) => {
                        let mut idle = pool.idle.lock().expect("pool mutex poisoned");
                        idle.push_back(conn);
                        drop(idle);
                        pool.update_gauges();
                    }
                    Err(err) => {
                        pool.total.fetch_sub(1, Ordering::Relaxed);
                        pool.idle_len.fetch_sub(1, Ordering::Relaxed);
                        debug!("min-idle dial failed: {err}");
                    }
                }
            });
        }
    }

    fn spawn_reaper(self: &Arc<Self>) {
        let Some(period) = self.opt.reaper_period() else {
            return;
        };
        let pool = Arc::downgrade(self);
        let shutdown = Arc::clone(&self.reaper_shutdown);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(pool) = pool.upgrade() else { break };
                        if pool.is_closed() {
                            break;
                        }
                        pool.reap_stale();
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });
    }

    /// One reaper sweep: closes every idle connection past its idle or
    /// age limit.
    fn reap_stale(&self) {
        let mut stale = Vec::new();
        {
            let mut idle = self.idle.lock().expect("pool mutex poisoned");
            let mut keep = VecDeque::with_capacity(idle.len());
            while let Some(conn) = idle.pop_front() {
                if self.is_stale(&conn) {
                    stale.push(conn);
                } else {
                    keep.push_back(conn);
                }
            }
            *idle = keep;
        }
        if stale.is_empty() {
            return;
        }
        let reaped = stale.len() as u32;
        self.idle_len.fetch_sub(reaped, Ordering::Relaxed);
        self.total.fetch_sub(reaped, Ordering::Relaxed);
        self.stale.fetch_add(reaped, Ordering::Relaxed);
        debug!("reaped {reaped} stale connections");
        drop(stale);
        self.update_gauges();
    }

    fn observe_acquire(&self, outcome: &str, start: Instant) {
        if let Some(m) = &self.opt.pool_metrics {
            m.acquire_duration
                .with_label_values(&[outcome])
                .observe(start.elapsed().as_secs_f64());
        }
        self.update_gauges();
    }

    fn update_gauges(&self) {
        if let Some(m) = &self.opt.pool_metrics {
            let idle = self.idle_len.load(Ordering::Relaxed) as i64;
            let total = self.total.load(Ordering::Relaxed) as i64;
            m.idle_connections.set(idle);
            m.active_connections.set((total - idle).max(0));
        }
    }
}

/// A checked-out connection. Return it with [`ConnPool::put`] or
/// [`ConnPool::remove`]; if the holding future is dropped mid-flight the
/// connection's state is unknown and `Drop` evicts it.
pub(crate) struct PooledConn {
    conn: Option<Conn>,
    _permit: Option<OwnedSemaphorePermit>,
    pool: Arc<ConnPool>,
}

impl PooledConn {
    fn new(conn: Conn, permit: OwnedSemaphorePermit, pool: &Arc<ConnPool>) -> PooledConn {
        PooledConn {
            conn: Some(conn),
            _permit: Some(permit),
            pool: Arc::clone(pool),
        }
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Conn {
        self.conn.as_mut().expect("connection already released")
    }

    pub(crate) fn inited(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| c.inited)
    }

    pub(crate) fn set_inited(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.inited = true;
        }
    }

    /// Evicts this connection from its owning pool.
    pub(crate) fn discard(self) {
        let pool = Arc::clone(&self.pool);
        pool.remove(self);
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn);
            self.pool.total.fetch_sub(1, Ordering::Relaxed);
            self.pool.update_gauges();
            self.pool.check_min_idle();
        }
    }
}

/// Wraps one already-acquired connection so that connection
/// initialisation commands cannot recurse into the pool. `get` hands out
/// the wrapped connection, `put` parks it back, eviction goes to the
/// parent pool's accounting through the guard itself.
pub(crate) struct SingleConnPool {
    slot: Mutex<Option<PooledConn>>,
}

impl SingleConnPool {
    pub(crate) fn new(pc: PooledConn) -> SingleConnPool {
        SingleConnPool {
            slot: Mutex::new(Some(pc)),
        }
    }

    pub(crate) fn get(&self) -> Result<PooledConn, Error> {
        self.slot
            .lock()
            .expect("pool mutex poisoned")
            .take()
            .ok_or(Error::ConnBusy)
    }

    pub(crate) fn put(&self, pc: PooledConn) {
        *self.slot.lock().expect("pool mutex poisoned") = Some(pc);
    }

    pub(crate) fn remove(&self, pc: PooledConn) {
        pc.discard();
    }

    /// Takes the wrapped connection back out, if eviction has not
    /// consumed it.
    pub(crate) fn take(&self) -> Option<PooledConn> {
        self.slot.lock().expect("pool mutex poisoned").take()
    }
}

/// A lazy dedicated-connection facade over the shared pool. The first
/// `get` borrows a connection from the parent; every later `get` returns
/// that same connection, waiting if another call holds it. `close`
/// releases the connection back to the parent pool.
pub(crate) struct StickyConnPool {
    parent: Arc<ConnPool>,
    slot: Mutex<StickySlot>,
    available: Notify,
    closed: AtomicBool,
}

enum StickySlot {
    Empty,
    Free(PooledConn),
    Taken,
}

impl StickyConnPool {
    pub(crate) fn new(parent: Arc<ConnPool>) -> StickyConnPool {
        StickyConnPool {
            parent,
            slot: Mutex::new(StickySlot::Empty),
            available: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) async fn get(&self) -> Result<PooledConn, Error> {
        loop {
            if self.is_closed() {
                return Err(Error::Closed);
            }
            {
                let mut slot = self.slot.lock().expect("pool mutex poisoned");
                match std::mem::replace(&mut *slot, StickySlot::Taken) {
                    StickySlot::Free(pc) => return Ok(pc),
                    StickySlot::Empty => break,
                    StickySlot::Taken => {}
                }
            }
            self.available.notified().await;
        }

        match self.parent.get().await {
            Ok(pc) => Ok(pc),
            Err(err) => {
                self.clear_slot();
                Err(err)
            }
        }
    }

    pub(crate) fn put(&self, pc: PooledConn) {
        if self.is_closed() {
            self.parent.put(pc);
            return;
        }
        *self.slot.lock().expect("pool mutex poisoned") = StickySlot::Free(pc);
        self.available.notify_one();
    }

    /// Drops the bound connection; the next `get` borrows a fresh one.
    pub(crate) fn remove(&self, pc: PooledConn) {
        pc.discard();
        self.clear_slot();
    }

    pub(crate) fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let slot = std::mem::replace(
            &mut *self.slot.lock().expect("pool mutex poisoned"),
            StickySlot::Empty,
        );
        if let StickySlot::Free(pc) = slot {
            self.parent.put(pc);
        }
        self.available.notify_waiters();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn clear_slot(&self) {
        *self.slot.lock().expect("pool mutex poisoned") = StickySlot::Empty;
        self.available.notify_one();
    }
}

/// Dispatch over the three pool shapes the client runs against.
#[derive(Clone)]
pub(crate) enum Pooler {
    Pool(Arc<ConnPool>),
    Single(Arc<SingleConnPool>),
    Sticky(Arc<StickyConnPool>),
}

impl Pooler {
    pub(crate) async fn get(&self) -> Result<PooledConn, Error> {
        match self {
            Pooler::Pool(p) => p.get().await,
            Pooler::Single(p) => p.get(),
            Pooler::Sticky(p) => p.get().await,
        }
    }

    pub(crate) fn put(&self, pc: PooledConn) {
        match self {
            Pooler::Pool(p) => p.put(pc),
            Pooler::Single(p) => p.put(pc),
            Pooler::Sticky(p) => p.put(pc),
        }
    }

    pub(crate) fn remove(&self, pc: PooledConn) {
        match self {
            Pooler::Pool(p) => p.remove(pc),
            Pooler::Single(p) => p.remove(pc),
            Pooler::Sticky(p) => p.remove(pc),
        }
    }

    pub(crate) fn close(&self) -> Result<(), Error> {
        match self {
            Pooler::Pool(p) => p.close(),
            Pooler::Single(_) => Ok(()),
            Pooler::Sticky(p) => p.close(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_start_at_zero() {
        let stats = PoolStats::default();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.total_conns, 0);
    }
}
