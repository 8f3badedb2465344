use crate::actors::ActorPool;

const SPEED: f64 = 0.03;
const RADIUS: f64 = 14.0;
const ORBIT_RADIUS: f64 = 6.0;
const CENTER: (f64, f64) = (50.0, 50.0);

/// Moves the first actor around a circle and the second one around it.
#[derive(Debug, Default)]
pub struct CursorOrbit {
    t: f64,
}

impl CursorOrbit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positions(t: f64) -> [(f64, f64); 2] {
        let x1 = CENTER.0 + t.cos() * RADIUS;
        let y1 = CENTER.1 + t.sin() * RADIUS;
        let x2 = x1 + (t * -2.0).cos() * ORBIT_RADIUS;
        let y2 = y1 + (t * -2.0).sin() * ORBIT_RADIUS;
        [(x1, y1), (x2, y2)]
    }

    /// Needs at least two actors, otherwise does nothing.
    pub fn tick(&mut self, pool: &mut ActorPool) {
        if pool.len() < 2 {
            return;
        }
        self.t += SPEED;
        for (index, (x, y)) in Self::positions(self.t).into_iter().enumerate() {
            if let Some(actor) = pool.get_mut(index) {
                if let Err(e) = actor.move_cursor(x, y) {
                    tracing::debug!(actor = index, error = %e, "cursor update dropped");
                }
            }
        }
    }
}
