// SPDX-FileCopyrightText: 2025 The superseedr Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Cubic-shaped request window with slow start.
//!
//! The window is a real-valued ceiling on outstanding requests. It grows by
//! one per scheduling tick until `ssthresh`, then follows
//! `W(t) = C * (t - K)^3 + W_max` with `K = cbrt(W_max * B / C)`, measured from
//! the last loss. A loss multiplies the window by `1 - B`.

use std::time::Instant;

const MIN_WINDOW: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicParams {
    /// Scaling constant `C`.
    pub c: f64,
    /// Multiplicative decrease factor `B`.
    pub beta: f64,
    pub initial_ssthresh: f64,
}

impl Default for CubicParams {
    fn default() -> Self {
        Self {
            c: 0.4,
            beta: 0.2,
            initial_ssthresh: 64.0,
        }
    }
}

impl CubicParams {
    /// `C` positive, `0 < B < 1`, and a starting threshold of at least one
    /// window slot.
    pub fn is_usable(&self) -> bool {
        self.c.is_finite()
            && self.c > 0.0
            && self.beta > 0.0
            && self.beta < 1.0
            && self.initial_ssthresh.is_finite()
            && self.initial_ssthresh >= MIN_WINDOW
    }
}

#[derive(Debug, Clone)]
pub struct CubicController {
    params: CubicParams,
    window: f64,
    ssthresh: f64,
    w_max: f64,
    t_loss: Instant,
    in_flight: usize,
    loss_events: u64,
}

impl CubicController {
    pub fn new(params: CubicParams, now: Instant) -> Self {
        Self {
            params,
            window: MIN_WINDOW,
            ssthresh: params.initial_ssthresh,
            w_max: 0.0,
            t_loss: now,
            in_flight: 0,
            loss_events: 0,
        }
    }

    pub fn window(&self) -> f64 {
        self.window
    }

    pub fn ssthresh(&self) -> f64 {
        self.ssthresh
    }

    pub fn w_max(&self) -> f64 {
        self.w_max
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn loss_events(&self) -> u64 {
        self.loss_events
    }

    /// Time from the last loss at which the cubic curve returns to `w_max`.
    pub fn k(&self) -> f64 {
        (self.w_max * self.params.beta / self.params.c).cbrt()
    }

    /// Called once per scheduling tick.
    pub fn advance(&mut self, now: Instant) {
        if self.window < self.ssthresh {
            self.window += 1.0;
            return;
        }

        let t = now.saturating_duration_since(self.t_loss).as_secs_f64();
        let w_cubic = self.params.c * (t - self.k()).powi(3) + self.w_max;
        if w_cubic > self.window {
            self.window += (w_cubic - self.window) / self.window;
        }
    }

    pub fn on_loss(&mut self, now: Instant) {
        let window_before_loss = self.window;
        self.window = (self.window * (1.0 - self.params.beta)).max(MIN_WINDOW);
        self.ssthresh = self.window;
        self.w_max = self.w_max.max(window_before_loss);
        self.t_loss = now;
        self.loss_events += 1;
    }

    pub fn credit_available(&self) -> bool {
        self.in_flight < self.window.floor() as usize
    }

    pub fn on_request_sent(&mut self) {
        self.in_flight += 1;
    }

    pub fn on_request_settled(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }
}
