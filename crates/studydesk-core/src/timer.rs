use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tracing::{debug, info, trace};

const TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerMode {
    Pomodoro,
    ShortBreak,
    LongBreak,
}

impl TimerMode {
    pub fn label(self) -> &'static str {
        match self {
            TimerMode::Pomodoro => "pomodoro",
            TimerMode::ShortBreak => "short break",
            TimerMode::LongBreak => "long break",
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TimerMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pomodoro" | "focus" | "work" => Ok(TimerMode::Pomodoro),
            "short" | "shortbreak" | "short_break" | "short-break" => Ok(TimerMode::ShortBreak),
            "long" | "longbreak" | "long_break" | "long-break" => Ok(TimerMode::LongBreak),
            other => Err(anyhow!("unknown timer mode: {other}")),
        }
    }
}

/// Countdown value. `seconds` is always below 60.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remaining {
    pub minutes: u32,
    pub seconds: u32,
}

impl Remaining {
    pub const ZERO: Remaining = Remaining {
        minutes: 0,
        seconds: 0,
    };

    pub fn from_minutes(minutes: u32) -> Self {
        Self {
            minutes,
            seconds: 0,
        }
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    pub fn total_seconds(self) -> u64 {
        u64::from(self.minutes) * 60 + u64::from(self.seconds)
    }

    /// One second less, floored at 00:00.
    pub fn decrement(self) -> Self {
        match (self.minutes, self.seconds) {
            (0, 0) => Self::ZERO,
            (minutes, 0) => Self {
                minutes: minutes - 1,
                seconds: 59,
            },
            (minutes, seconds) => Self {
                minutes,
                seconds: seconds - 1,
            },
        }
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes, self.seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSettings {
    pub pomodoro_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    /// Every n-th completed pomodoro is followed by a long break.
    pub long_break_every: u32,
    pub muted: bool,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            pomodoro_minutes: 40,
            short_break_minutes: 5,
            long_break_minutes: 15,
            long_break_every: 4,
            muted: false,
        }
    }
}

impl TimerSettings {
    pub fn nominal(&self, mode: TimerMode) -> Remaining {
        Remaining::from_minutes(match mode {
            TimerMode::Pomodoro => self.pomodoro_minutes,
            TimerMode::ShortBreak => self.short_break_minutes,
            TimerMode::LongBreak => self.long_break_minutes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub remaining: Remaining,
    pub mode: TimerMode,
    pub running: bool,
    pub pomodoros_completed: u32,
}

/// Emitted when a session runs out (or is skipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEnd {
    pub finished: TimerMode,
    pub next: TimerMode,
    pub pomodoros_completed: u32,
}

/// Completion alert.
pub trait Chime {
    fn ring(&mut self, finished: TimerMode);
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalBell;

impl Chime for TerminalBell {
    fn ring(&mut self, _finished: TimerMode) {
        let mut err = io::stderr().lock();
        let _ = err.write_all(b"\x07");
        let _ = err.flush();
    }
}

pub type ListenerId = u64;

type Listener = Box<dyn FnMut(&TimerSnapshot)>;

/// Pomodoro automaton. It has no clock of its own: something calls
/// [`FocusTimer::tick`] once per second while it runs.
pub struct FocusTimer {
    settings: TimerSettings,
    mode: TimerMode,
    remaining: Remaining,
    running: bool,
    pomodoros_completed: u32,
    chime: Box<dyn Chime>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: ListenerId,
}

impl FocusTimer {
    pub fn new(settings: TimerSettings, chime: Box<dyn Chime>) -> Self {
        let remaining = settings.nominal(TimerMode::Pomodoro);
        Self {
            settings,
            mode: TimerMode::Pomodoro,
            remaining,
            running: false,
            pomodoros_completed: 0,
            chime,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            remaining: self.remaining,
            mode: self.mode,
            running: self.running,
            pomodoros_completed: self.pomodoros_completed,
        }
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn remaining(&self) -> Remaining {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pomodoros_completed(&self) -> u32 {
        self.pomodoros_completed
    }

    pub fn settings(&self) -> &TimerSettings {
        &self.settings
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.settings.muted = muted;
    }

    /// Registers a callback that sees every state change.
    pub fn on_tick(&mut self, listener: impl FnMut(&TimerSnapshot) + 'static) -> ListenerId {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        before != self.listeners.len()
    }

    /// Returns false when already running.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        self.running = true;
        debug!(mode = %self.mode, remaining = %self.remaining, "timer started");
        self.notify();
        true
    }

    /// Returns false when already paused.
    pub fn pause(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        debug!(mode = %self.mode, remaining = %self.remaining, "timer paused");
        self.notify();
        true
    }

    /// Start/pause button. Returns the new running state.
    pub fn toggle(&mut self) -> bool {
        if self.running {
            self.pause();
        } else {
            self.start();
        }
        self.running
    }

    pub fn reset(&mut self) {
        self.switch_to(self.mode);
    }

    /// Manual tab selection; leaves the pomodoro counter alone.
    pub fn select_mode(&mut self, mode: TimerMode) {
        self.switch_to(mode);
    }

    /// One second elapsed. Does nothing while paused.
    pub fn tick(&mut self) -> Option<SessionEnd> {
        if !self.running {
            return None;
        }

        self.remaining = self.remaining.decrement();
        trace!(mode = %self.mode, remaining = %self.remaining, "tick");
        if !self.remaining.is_zero() {
            self.notify();
            return None;
        }

        self.running = false;
        let finished = self.mode;
        if !self.settings.muted {
            self.chime.ring(finished);
        }
        Some(self.advance(finished, true))
    }

    /// Ends the current session now. A skipped pomodoro is not counted.
    pub fn skip(&mut self) -> SessionEnd {
        self.running = false;
        let finished = self.mode;
        self.advance(finished, false)
    }

    fn advance(&mut self, finished: TimerMode, count_it: bool) -> SessionEnd {
        let next = match finished {
            TimerMode::Pomodoro => {
                if count_it {
                    self.pomodoros_completed += 1;
                }
                let every = self.settings.long_break_every.max(1);
                if count_it && self.pomodoros_completed % every == 0 {
                    TimerMode::LongBreak
                } else {
                    TimerMode::ShortBreak
                }
            }
            TimerMode::ShortBreak | TimerMode::LongBreak => TimerMode::Pomodoro,
        };

        info!(
            %finished,
            %next,
            pomodoros_completed = self.pomodoros_completed,
            "session ended"
        );
        self.switch_to(next);

        SessionEnd {
            finished,
            next,
            pomodoros_completed: self.pomodoros_completed,
        }
    }

    fn switch_to(&mut self, mode: TimerMode) {
        self.mode = mode;
        self.remaining = self.settings.nominal(mode);
        self.running = false;
        self.notify();
    }

    fn notify(&mut self) {
        let snapshot = self.snapshot();
        for (_, listener) in &mut self.listeners {
            listener(&snapshot);
        }
    }
}

/// Owns the single one-second schedule that feeds a [`FocusTimer`].
///
/// The schedule is armed only on a paused-to-running transition, so
/// repeated `start` calls never produce a second interval.
pub struct TimerDriver {
    timer: FocusTimer,
    next_due: Option<Instant>,
}

impl TimerDriver {
    pub fn new(timer: FocusTimer) -> Self {
        Self {
            timer,
            next_due: None,
        }
    }

    pub fn timer(&self) -> &FocusTimer {
        &self.timer
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn on_tick(&mut self, listener: impl FnMut(&TimerSnapshot) + 'static) -> ListenerId {
        self.timer.on_tick(listener)
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.timer.set_muted(muted);
    }

    pub fn start(&mut self, now: Instant) -> bool {
        if !self.timer.start() {
            return false;
        }
        self.next_due = Some(now + TICK);
        true
    }

    pub fn pause(&mut self) -> bool {
        self.next_due = None;
        self.timer.pause()
    }

    pub fn toggle(&mut self, now: Instant) -> bool {
        if self.timer.is_running() {
            self.pause();
        } else {
            self.start(now);
        }
        self.timer.is_running()
    }

    pub fn reset(&mut self) {
        self.next_due = None;
        self.timer.reset();
    }

    pub fn select_mode(&mut self, mode: TimerMode) {
        self.next_due = None;
        self.timer.select_mode(mode);
    }

    pub fn skip(&mut self) -> SessionEnd {
        self.next_due = None;
        self.timer.skip()
    }

    /// Fires one tick per whole second elapsed since the last one.
    /// Stops at the first session end; the next session needs `start`.
    pub fn poll(&mut self, now: Instant) -> Option<SessionEnd> {
        while let Some(due) = self.next_due {
            if now < due {
                break;
            }
            if let Some(end) = self.timer.tick() {
                self.next_due = None;
                return Some(end);
            }
            self.next_due = Some(due + TICK);
        }
        None
    }
}
