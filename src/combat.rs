//! Combat decision loop: poll the client window, detect the engagement
//! state, and act on one priority-resolved element per iteration.
//!
//! Each iteration works on a single capture. Resolution is pure (what to do
//! is decided before any input fires), so one iteration performs at most one
//! buff, or one cast, never both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::config::{AURA_CATEGORY, ENCHANT_CATEGORY, PriorityLists, UI_CATEGORY};
use crate::locator::{Frame, Locator, MatchHit, ScaleDirection, ScalePolicy};
use crate::platform::{GameWindow, Input, Key};
use crate::target::{Point, center, rest_point};

/// Key held between fights to keep the character spinning in place, which
/// keeps nearby mobs aggroing onto us.
const SPIN_KEY: Key = Key::Left;

const PASS_INDICATOR: &str = "pass";
const FLEE_INDICATOR: &str = "flee";
const LATENCY_DIALOG: &str = "latency";

/// Offset from the last cast target to the latency dialog's confirm button.
const LATENCY_DISMISS_OFFSET: (i32, i32) = (0, 120);

const DOUBLE_CLICK_INTERVAL: Duration = Duration::from_millis(150);
/// Pause after a cast before probing for the latency dialog, which takes a
/// moment to appear.
const CAST_SETTLE: Duration = Duration::from_millis(500);

/// Whether we are currently inside an encounter. Derived from the combat
/// indicators every iteration; the stored value only matters for deciding
/// whether the spin key needs toggling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatState {
    Idle,
    Engaged,
}

/// Spin-key side effect of a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinControl {
    Start,
    Stop,
    Keep,
}

/// Next state plus the spin-key action it requires. The key is held exactly
/// while Idle: Start on entering Idle (including the first iteration), Stop
/// on entering Engaged, Keep when the state is unchanged.
pub fn transition(prev: Option<CombatState>, engaged: bool) -> (CombatState, SpinControl) {
    match (prev, engaged) {
        (Some(CombatState::Engaged), true) => (CombatState::Engaged, SpinControl::Keep),
        (_, true) => (CombatState::Engaged, SpinControl::Stop),
        (Some(CombatState::Idle), false) => (CombatState::Idle, SpinControl::Keep),
        (_, false) => (CombatState::Idle, SpinControl::Start),
    }
}

/// First name in `names` that is visible in the frame, with its match.
/// Order in the list is the priority order; a hit short-circuits the rest.
pub fn resolve_priority(
    locator: &Locator,
    frame: &Frame,
    category: &str,
    names: &[String],
    policy: &ScalePolicy,
) -> Result<Option<(String, MatchHit)>> {
    for name in names {
        if let Some(hit) = locator.locate(frame, category, name, policy)? {
            return Ok(Some((name.clone(), hit)));
        }
    }
    Ok(None)
}

/// Per-element-kind scale policies. Indicators and the latency dialog are
/// fixed UI chrome and get a higher bar; enchant and aura card art is busier
/// and matches weaker. The recast policy re-finds a spell card after
/// enchanting changed its art: wider range, largest size first.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicies {
    pub indicator: ScalePolicy,
    pub aura: ScalePolicy,
    pub enchant: ScalePolicy,
    pub spell: ScalePolicy,
    pub recast: ScalePolicy,
    pub latency: ScalePolicy,
}

impl Default for MatchPolicies {
    fn default() -> Self {
        Self {
            indicator: ScalePolicy::default().with_confidence(0.7),
            aura: ScalePolicy::default().with_confidence(0.55),
            enchant: ScalePolicy::default().with_confidence(0.55),
            spell: ScalePolicy::default(),
            recast: ScalePolicy {
                min: 0.4,
                max: 2.0,
                step: 0.1,
                confidence: 0.625,
                direction: ScaleDirection::Descending,
            },
            latency: ScalePolicy::default().with_confidence(0.7),
        }
    }
}

/// What a single iteration did. Returned by `tick` so the loop (and tests)
/// can pick the follow-up interval without re-deriving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Capture failed; nothing was decided and the state is unchanged.
    WindowUnavailable,
    Idle,
    Buffed {
        name: String,
    },
    Cast {
        name: String,
        enchanted: bool,
        latency_cleared: bool,
    },
    /// Engaged, but no configured element is on screen yet (cards still
    /// dealing, or an unconfigured hand).
    NothingCastable,
}

pub struct CombatLoop<W: GameWindow, I: Input> {
    window: W,
    input: I,
    locator: Locator,
    lists: PriorityLists,
    policies: MatchPolicies,
    idle_interval: Duration,
    engaged_interval: Duration,
    state: Option<CombatState>,
}

impl<W: GameWindow, I: Input> CombatLoop<W, I> {
    pub fn new(
        window: W,
        input: I,
        locator: Locator,
        lists: PriorityLists,
        idle_interval: Duration,
        engaged_interval: Duration,
    ) -> Self {
        Self {
            window,
            input,
            locator,
            lists,
            policies: MatchPolicies::default(),
            idle_interval,
            engaged_interval,
            state: None,
        }
    }

    pub fn with_policies(mut self, policies: MatchPolicies) -> Self {
        self.policies = policies;
        self
    }

    /// Run one iteration against a fresh capture.
    pub fn tick(&mut self) -> Result<IterationOutcome> {
        let Some(frame) = self.window.capture()? else {
            tracing::warn!("window '{}' unavailable, skipping iteration", self.window.title());
            return Ok(IterationOutcome::WindowUnavailable);
        };

        let engaged = self.detect_engagement(&frame)?;
        let (state, spin) = transition(self.state, engaged);
        self.state = Some(state);
        match spin {
            SpinControl::Start => {
                tracing::info!("combat over, spinning for the next encounter");
                self.input.hold(SPIN_KEY);
            }
            SpinControl::Stop => {
                tracing::info!("combat detected");
                self.input.release(SPIN_KEY);
            }
            SpinControl::Keep => {}
        }

        if state == CombatState::Idle {
            tracing::debug!("waiting for combat");
            return Ok(IterationOutcome::Idle);
        }

        // Buff phase: an available aura preempts casting this turn.
        if let Some((name, hit)) = resolve_priority(
            &self.locator,
            &frame,
            AURA_CATEGORY,
            &self.lists.auras,
            &self.policies.aura,
        )? {
            tracing::info!("casting aura '{name}'");
            self.input.move_cursor(center(&hit));
            self.input.click(1, DOUBLE_CLICK_INTERVAL);
            self.park(&frame);
            return Ok(IterationOutcome::Buffed { name });
        }

        // Enchant phase: hover only, so a missing spell later leaves the
        // enchant card unspent.
        let enchant = resolve_priority(
            &self.locator,
            &frame,
            ENCHANT_CATEGORY,
            &self.lists.enchants,
            &self.policies.enchant,
        )?;
        let enchant_point = enchant.as_ref().map(|(_, hit)| center(hit));
        if let Some((name, hit)) = &enchant {
            tracing::debug!("enchant '{name}' available");
            self.input.move_cursor(center(hit));
        }

        let Some((name, hit)) = resolve_priority(
            &self.locator,
            &frame,
            &self.lists.school,
            &self.lists.spells,
            &self.policies.spell,
        )?
        else {
            tracing::info!("no castable spell on screen");
            self.park(&frame);
            return Ok(IterationOutcome::NothingCastable);
        };

        let spell_center = center(&hit);
        let (enchanted, last_target) = match enchant_point {
            Some(enchant_point) => {
                let target = self.cast_enchanted(&name, enchant_point, spell_center)?;
                (true, target)
            }
            None => {
                tracing::info!("casting '{name}'");
                self.input.move_cursor(spell_center);
                self.input.click(1, DOUBLE_CLICK_INTERVAL);
                (false, spell_center)
            }
        };

        std::thread::sleep(CAST_SETTLE);
        let latency_cleared = self.dismiss_latency_dialog(last_target)?;

        self.park(&frame);
        Ok(IterationOutcome::Cast {
            name,
            enchanted,
            latency_cleared,
        })
    }

    /// Poll forever until `running` clears, sleeping the outcome-appropriate
    /// interval between iterations. The spin key is released on every exit
    /// path, including a failing iteration.
    pub fn run(&mut self, running: &AtomicBool) -> Result<()> {
        let result = self.poll(running);
        self.input.release(SPIN_KEY);
        tracing::info!("combat loop stopped");
        result
    }

    fn poll(&mut self, running: &AtomicBool) -> Result<()> {
        while running.load(Ordering::SeqCst) {
            let outcome = self.tick()?;
            let interval = match outcome {
                IterationOutcome::Idle | IterationOutcome::WindowUnavailable => self.idle_interval,
                _ => self.engaged_interval,
            };
            let deadline = Instant::now() + interval;
            while running.load(Ordering::SeqCst) && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(100));
            }
        }
        Ok(())
    }

    /// Either indicator proves engagement; pass is checked first because it
    /// is present in every fight layout.
    fn detect_engagement(&self, frame: &Frame) -> Result<bool> {
        for indicator in [PASS_INDICATOR, FLEE_INDICATOR] {
            if self
                .locator
                .locate(frame, UI_CATEGORY, indicator, &self.policies.indicator)?
                .is_some()
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Click the hovered enchant card, then apply it to the spell card and
    /// cast. Enchanting repaints the card art, so the card is re-located on a
    /// fresh capture at the wider recast range; if that misses, the original
    /// center is still the best guess. Returns the point the cast landed on.
    fn cast_enchanted(
        &mut self,
        name: &str,
        enchant_point: Point,
        spell_center: Point,
    ) -> Result<Point> {
        tracing::info!("casting enchanted '{name}'");
        self.input.move_cursor(enchant_point);
        self.input.click(1, DOUBLE_CLICK_INTERVAL);
        self.input.move_cursor(spell_center);

        let target = match self.window.capture()? {
            Some(fresh) => self
                .locator
                .locate(&fresh, &self.lists.school, name, &self.policies.recast)?
                .map(|hit| center(&hit))
                .unwrap_or(spell_center),
            None => spell_center,
        };

        self.input.move_cursor(target);
        self.input.click(2, DOUBLE_CLICK_INTERVAL);
        Ok(target)
    }

    /// The "connection latency" dialog swallows clicks until confirmed.
    /// Probe a fresh capture; the confirm button sits a fixed offset below
    /// the point the cast landed on.
    fn dismiss_latency_dialog(&mut self, last_target: Point) -> Result<bool> {
        let Some(fresh) = self.window.capture()? else {
            return Ok(false);
        };
        if self
            .locator
            .locate(&fresh, UI_CATEGORY, LATENCY_DIALOG, &self.policies.latency)?
            .is_none()
        {
            return Ok(false);
        }

        tracing::warn!("latency dialog detected, dismissing");
        let (dx, dy) = LATENCY_DISMISS_OFFSET;
        self.input.move_cursor(last_target.offset(dx, dy));
        self.input.click(1, DOUBLE_CLICK_INTERVAL);
        Ok(true)
    }

    /// Park the cursor so hover tooltips cannot occlude the next capture.
    fn park(&mut self, frame: &Frame) {
        self.input.move_cursor(rest_point(&frame.region));
    }
}
