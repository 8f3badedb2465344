use super::{ColorMode, Palette, Rgb};
use crate::actors::ActorPool;
use crate::config::{ColorConfig, ReactiveTuning};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MIN_GLOBAL_STEP_MS: u64 = 150;
const MIN_SPEED: f64 = 0.1;
const MIN_REACTIVE_MS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationMode {
    /// Smooth palette interpolation on a fixed tick
    #[default]
    Global,
    /// Discrete palette cycling, tick interval follows the NPS meter
    Reactive,
    /// No periodic animation, colors only change on connect and load
    User,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAssignment {
    pub actor: usize,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReactiveAction {
    Unchanged,
    /// Timer rebuilt with a new interval
    Retime(Duration),
    /// Timer halted, idle colors to broadcast
    Idle(Vec<ColorAssignment>),
}

pub struct ColorAnimator {
    mode: AnimationMode,
    palette: Palette,
    idle_color: Rgb,
    cycle: Duration,
    speed: f64,
    step: Duration,
    tuning: ReactiveTuning,
    interval: Option<Duration>,
    idle: bool,
    generation: u64,
}

impl ColorAnimator {
    pub fn new(config: &ColorConfig) -> Self {
        let cycle = Duration::from_millis(config.cycle_ms.max(1));
        let step = Duration::from_millis((config.cycle_ms / 16).max(MIN_GLOBAL_STEP_MS));
        Self {
            mode: config.mode,
            palette: Palette::new(config.resolved_palette()),
            idle_color: config.idle_color,
            cycle,
            speed: config.speed.max(MIN_SPEED),
            step,
            tuning: config.reactive.clone(),
            interval: None,
            idle: false,
            generation: 0,
        }
    }

    pub fn mode(&self) -> AnimationMode {
        self.mode
    }

    /// Ticks carrying another generation belong to a replaced timer.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        match self.mode {
            AnimationMode::Global => Some(self.step),
            AnimationMode::Reactive => self.interval,
            AnimationMode::User => None,
        }
    }

    pub fn phase(&self) -> f64 {
        self.palette.phase()
    }

    /// Colors sent when an actor connects or a file load starts.
    pub fn load_colors(&mut self, pool: &ActorPool) -> Vec<ColorAssignment> {
        pool.iter()
            .map(|actor| {
                let color = match actor.color_mode() {
                    ColorMode::Normal => actor.base_color(),
                    ColorMode::Rainbow | ColorMode::Animated => self.palette.next_color(),
                };
                ColorAssignment {
                    actor: actor.index(),
                    color,
                }
            })
            .collect()
    }

    pub fn tick(&mut self, pool: &ActorPool) -> Vec<ColorAssignment> {
        match self.mode {
            AnimationMode::Global => {
                let len = self.palette.len() as f64;
                let delta =
                    self.step.as_secs_f64() / (self.cycle.as_secs_f64() * self.speed) * len;
                self.palette.advance(delta);
                let phase = self.palette.phase();
                pool.iter()
                    .map(|actor| {
                        let color = match actor.color_mode() {
                            ColorMode::Normal => actor.base_color(),
                            ColorMode::Rainbow => self.palette.sample(phase),
                            ColorMode::Animated => {
                                self.palette.sample(phase + actor.index() as f64)
                            }
                        };
                        ColorAssignment {
                            actor: actor.index(),
                            color,
                        }
                    })
                    .collect()
            }
            AnimationMode::Reactive => {
                self.palette.next_color();
                pool.iter()
                    .map(|actor| {
                        let color = match actor.color_mode() {
                            ColorMode::Normal => actor.base_color(),
                            ColorMode::Rainbow => self.palette.at_cursor(0),
                            ColorMode::Animated => self.palette.at_cursor(actor.index()),
                        };
                        ColorAssignment {
                            actor: actor.index(),
                            color,
                        }
                    })
                    .collect()
            }
            AnimationMode::User => Vec::new(),
        }
    }

    /// Target tick interval for a given NPS reading, at least 1 ms.
    pub fn reactive_interval(&self, nps: f64) -> Duration {
        let tuning = &self.tuning;
        let ratio = (nps / tuning.ceiling_nps).clamp(0.0, 1.0);
        let span = tuning.idle_ms.saturating_sub(tuning.floor_ms) as f64;
        let ms = (tuning.idle_ms as f64 - span * ratio).round() as u64;
        Duration::from_millis(ms.max(MIN_REACTIVE_MS))
    }

    /// Called once per meter tick in reactive mode.
    pub fn retune(&mut self, nps: f64, pool: &ActorPool) -> ReactiveAction {
        if self.mode != AnimationMode::Reactive {
            return ReactiveAction::Unchanged;
        }

        if nps < self.tuning.idle_threshold {
            if self.interval.take().is_some() {
                self.generation += 1;
            }
            if self.idle {
                return ReactiveAction::Unchanged;
            }
            self.idle = true;
            let idle_color = self.idle_color;
            let colors = pool
                .iter()
                .map(|actor| ColorAssignment {
                    actor: actor.index(),
                    color: match actor.color_mode() {
                        ColorMode::Normal => actor.base_color(),
                        ColorMode::Rainbow | ColorMode::Animated => idle_color,
                    },
                })
                .collect();
            return ReactiveAction::Idle(colors);
        }

        self.idle = false;
        let target = self.reactive_interval(nps);
        let hysteresis = Duration::from_millis(self.tuning.hysteresis_ms);
        match self.interval {
            Some(current) if current.abs_diff(target) <= hysteresis => ReactiveAction::Unchanged,
            _ => {
                self.interval = Some(target);
                self.generation += 1;
                ReactiveAction::Retime(target)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::test_pool;
    use crate::color::DARK_PALETTE;

    fn config(mode: AnimationMode) -> ColorConfig {
        ColorConfig {
            mode,
            ..ColorConfig::default()
        }
    }

    #[test]
    fn global_step_has_a_floor() {
        let animator = ColorAnimator::new(&config(AnimationMode::Global));
        assert_eq!(animator.tick_interval(), Some(Duration::from_millis(150)));

        let slow = ColorAnimator::new(&ColorConfig {
            cycle_ms: 8000,
            ..config(AnimationMode::Global)
        });
        assert_eq!(slow.tick_interval(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn global_tick_advances_phase_and_respects_modes() {
        let (pool, _rx) = test_pool(&[ColorMode::Normal, ColorMode::Rainbow, ColorMode::Animated]);
        let mut animator = ColorAnimator::new(&config(AnimationMode::Global));

        let colors = animator.tick(&pool);
        // 150ms / 2000ms * 8 entries
        assert!((animator.phase() - 0.6).abs() < 1e-9);
        assert_eq!(colors.len(), 3);
        assert_eq!(colors[0].color, pool.get(0).unwrap().base_color());
        assert_eq!(colors[1].color, DARK_PALETTE[0].lerp(DARK_PALETTE[1], 0.6));
        assert_eq!(colors[2].color, DARK_PALETTE[2].lerp(DARK_PALETTE[3], 0.6));
    }

    #[test]
    fn speed_factor_slows_the_cycle() {
        let (pool, _rx) = test_pool(&[ColorMode::Rainbow]);
        let mut animator = ColorAnimator::new(&ColorConfig {
            speed: 2.0,
            ..config(AnimationMode::Global)
        });
        animator.tick(&pool);
        assert!((animator.phase() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn reactive_interval_shrinks_with_load() {
        let animator = ColorAnimator::new(&config(AnimationMode::Reactive));
        assert_eq!(animator.reactive_interval(0.0), Duration::from_millis(2000));
        assert_eq!(animator.reactive_interval(10.0), Duration::from_millis(1025));
        assert_eq!(animator.reactive_interval(20.0), Duration::from_millis(50));
        assert_eq!(animator.reactive_interval(500.0), Duration::from_millis(50));
    }

    #[test]
    fn reactive_interval_never_reaches_zero() {
        let mut color = config(AnimationMode::Reactive);
        color.reactive.floor_ms = 0;
        let animator = ColorAnimator::new(&color);
        assert_eq!(animator.reactive_interval(500.0), Duration::from_millis(1));

        color.reactive.idle_ms = 0;
        let animator = ColorAnimator::new(&color);
        assert_eq!(animator.reactive_interval(0.0), Duration::from_millis(1));
    }

    #[test]
    fn reactive_idle_halts_timer_once() {
        let (pool, _rx) = test_pool(&[ColorMode::Rainbow, ColorMode::Normal]);
        let mut animator = ColorAnimator::new(&config(AnimationMode::Reactive));

        assert_eq!(
            animator.retune(5.0, &pool),
            ReactiveAction::Retime(Duration::from_millis(1513))
        );
        let running = animator.generation();

        match animator.retune(0.05, &pool) {
            ReactiveAction::Idle(colors) => {
                assert_eq!(colors[0].color, Rgb::new(0x80, 0x80, 0x80));
                assert_eq!(colors[1].color, pool.get(1).unwrap().base_color());
            }
            other => panic!("expected idle, got {:?}", other),
        }
        assert_eq!(animator.tick_interval(), None);
        assert_ne!(animator.generation(), running);
        assert_eq!(animator.retune(0.0, &pool), ReactiveAction::Unchanged);
    }

    #[test]
    fn reactive_hysteresis_avoids_timer_churn() {
        let (pool, _rx) = test_pool(&[ColorMode::Rainbow]);
        let mut animator = ColorAnimator::new(&config(AnimationMode::Reactive));

        assert!(matches!(animator.retune(10.0, &pool), ReactiveAction::Retime(_)));
        let generation = animator.generation();
        // 10.2 nps moves the target by ~20ms
        assert_eq!(animator.retune(10.2, &pool), ReactiveAction::Unchanged);
        assert_eq!(animator.generation(), generation);
        assert_eq!(
            animator.retune(12.0, &pool),
            ReactiveAction::Retime(Duration::from_millis(830))
        );
        assert_eq!(animator.generation(), generation + 1);
    }

    #[test]
    fn user_mode_never_animates() {
        let (pool, _rx) = test_pool(&[ColorMode::Rainbow]);
        let mut animator = ColorAnimator::new(&config(AnimationMode::User));
        assert_eq!(animator.tick_interval(), None);
        assert!(animator.tick(&pool).is_empty());
        assert_eq!(animator.retune(50.0, &pool), ReactiveAction::Unchanged);
    }

    #[test]
    fn load_colors_step_rainbow_actors_only() {
        let (pool, _rx) = test_pool(&[ColorMode::Rainbow, ColorMode::Normal, ColorMode::Rainbow]);
        let mut animator = ColorAnimator::new(&config(AnimationMode::User));
        let colors = animator.load_colors(&pool);
        assert_eq!(colors[0].color, DARK_PALETTE[1]);
        assert_eq!(colors[1].color, pool.get(1).unwrap().base_color());
        assert_eq!(colors[2].color, DARK_PALETTE[2]);
    }
}
