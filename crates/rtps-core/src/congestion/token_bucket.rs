// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Token bucket sized by a throughput controller.
//!
//! The bucket holds at most `bytes_per_period` tokens and regains
//! `bytes_per_period` tokens every `period`, continuously. Refill math is
//! done in integer nanoseconds; the sub-token remainder is carried over so
//! slow rates do not round down to zero.

use std::time::{Duration, Instant};

/// Token bucket rate limiter.
///
/// Each send consumes tokens equal to the datagram size.
#[derive(Debug)]
pub struct TokenBucket {
    /// Current token count (in bytes).
    tokens: u64,
    /// Maximum token capacity (burst size in bytes).
    capacity: u64,
    /// Refill period in nanoseconds (never zero).
    period_ns: u128,
    /// Remainder of the last refill, in byte-nanoseconds.
    carry: u128,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket allowing `bytes_per_period` bytes every `period`.
    pub fn new(bytes_per_period: u64, period: Duration) -> Self {
        Self {
            tokens: bytes_per_period,
            capacity: bytes_per_period,
            period_ns: period.as_nanos().max(1),
            carry: 0,
            last_refill: Instant::now(),
        }
    }

    /// Create a bucket starting empty.
    pub fn new_empty(bytes_per_period: u64, period: Duration) -> Self {
        let mut bucket = Self::new(bytes_per_period, period);
        bucket.tokens = 0;
        bucket
    }

    /// Consume `bytes` if available. No tokens are consumed on failure.
    pub fn try_consume(&mut self, bytes: u64) -> bool {
        self.refill();
        if self.tokens >= bytes {
            self.tokens -= bytes;
            true
        } else {
            false
        }
    }

    pub fn has_tokens(&mut self, bytes: u64) -> bool {
        self.refill();
        self.tokens >= bytes
    }

    pub fn tokens(&mut self) -> u64 {
        self.refill();
        self.tokens
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.period_ns.min(u128::from(u64::MAX)) as u64)
    }

    /// Replace the limits, keeping at most the new capacity.
    pub fn set_limits(&mut self, bytes_per_period: u64, period: Duration) {
        self.refill();
        self.capacity = bytes_per_period;
        self.period_ns = period.as_nanos().max(1);
        self.tokens = self.tokens.min(bytes_per_period);
        self.carry = 0;
    }

    /// Time until `bytes` tokens will be available.
    ///
    /// Returns `Duration::ZERO` if already available and `Duration::MAX` if
    /// `bytes` exceeds the capacity.
    pub fn time_until_available(&mut self, bytes: u64) -> Duration {
        self.refill();
        if self.tokens >= bytes {
            return Duration::ZERO;
        }
        if bytes > self.capacity || self.capacity == 0 {
            return Duration::MAX;
        }
        let needed = u128::from(bytes - self.tokens);
        let capacity = u128::from(self.capacity);
        let ns = (needed * self.period_ns)
            .saturating_sub(self.carry)
            .div_ceil(capacity);
        Duration::from_nanos(ns.min(u128::from(u64::MAX)) as u64)
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_nanos();
        self.last_refill = now;
        if elapsed == 0 || self.tokens >= self.capacity {
            self.carry = 0;
            return;
        }
        let produced = elapsed * u128::from(self.capacity) + self.carry;
        let add = produced / self.period_ns;
        self.carry = produced % self.period_ns;
        let add = add.min(u128::from(u64::MAX)) as u64;
        self.tokens = self.tokens.saturating_add(add).min(self.capacity);
        if self.tokens == self.capacity {
            self.carry = 0;
        }
    }

    /// Reset the bucket to full capacity.
    pub fn reset(&mut self) {
        self.tokens = self.capacity;
        self.carry = 0;
        self.last_refill = Instant::now();
    }

    /// Reset the bucket to empty.
    pub fn drain(&mut self) {
        self.tokens = 0;
        self.carry = 0;
        self.last_refill = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_new_starts_full() {
        let mut bucket = TokenBucket::new(500, Duration::from_millis(100));
        assert_eq!(bucket.tokens(), 500);
        assert_eq!(bucket.capacity(), 500);
    }

    #[test]
    fn test_try_consume() {
        let mut bucket = TokenBucket::new(100, Duration::from_secs(1));
        assert!(bucket.try_consume(60));
        assert!(!bucket.try_consume(60));
        assert!(bucket.try_consume(40));
    }

    #[test]
    fn test_refill_over_period() {
        // 1000 bytes every 100ms
        let mut bucket = TokenBucket::new_empty(1000, Duration::from_millis(100));
        thread::sleep(Duration::from_millis(50));
        let tokens = bucket.tokens();
        assert!((300..=1000).contains(&tokens), "tokens={}", tokens);
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let mut bucket = TokenBucket::new(100, Duration::from_millis(1));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(bucket.tokens(), 100);
    }

    #[test]
    fn test_time_until_available() {
        let mut bucket = TokenBucket::new(1000, Duration::from_secs(1));
        assert_eq!(bucket.time_until_available(1000), Duration::ZERO);
        bucket.drain();
        let wait = bucket.time_until_available(500);
        assert!(wait.as_millis() >= 450 && wait.as_millis() <= 500, "{:?}", wait);
        assert_eq!(bucket.time_until_available(2000), Duration::MAX);
    }

    #[test]
    fn test_set_limits_clamps() {
        let mut bucket = TokenBucket::new(1000, Duration::from_secs(1));
        bucket.set_limits(200, Duration::from_millis(10));
        assert_eq!(bucket.capacity(), 200);
        assert_eq!(bucket.tokens(), 200);
        assert_eq!(bucket.period(), Duration::from_millis(10));
    }

    #[test]
    fn test_reset_and_drain() {
        let mut bucket = TokenBucket::new(100, Duration::from_secs(10));
        bucket.drain();
        assert!(!bucket.has_tokens(1));
        bucket.reset();
        assert!(bucket.has_tokens(100));
    }
}
