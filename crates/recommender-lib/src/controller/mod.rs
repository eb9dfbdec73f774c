//! Response-time feedback controller
//!
//! Computes a CPU target for a container from live service telemetry
//! instead of historical percentiles. The control law is a PI controller
//! on the response-time error whose output is a target utilization. The
//! utilization is turned into a core count by inverting a queuing model
//! relating capacity, arrival rate and utilization:
//!
//! ```text
//! error      = SLA/1000 - rt/1000
//! ke         = (A - 1) / (P_nom - 1) * error
//! ui         = ui_prev + (1 - P_nom) * ke
//! ut         = ui + ke
//! targetCore = req * (ut - a1 - 1000*a2) / (1000*a3 * (a1 - ut))
//! approxCore = clamp(|targetCore|, coreMin, coreMax)
//! approxUt   = ((1000*a2 + a1)*req + 1000*a1*a3*approxCore) / (req + 1000*a3*approxCore)
//! ui_next    = approxUt - ke
//! ```
//!
//! The integral is back-calculated from the utilization the saturated
//! output actually realizes (`approxUt`), which keeps it bounded while the
//! output sits at a limit.
//!
//! [`FeedbackController::step`] is pure: telemetry is fetched elsewhere and
//! the caller owns the [`ControllerState`].

mod state;

pub use state::{ControllerState, ControllerStates};

use crate::config::ControllerConfig;

/// Below this distance from `a1` the model inversion is treated as singular
pub const SINGULARITY_EPSILON: f64 = 1e-9;

/// Telemetry consumed by one controller step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerInput {
    /// Mean response time in milliseconds
    pub response_time_ms: f64,
    /// Requests since the previous evaluation of this container
    pub requests: f64,
}

/// Result of one controller step, including intermediate terms for logging
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerOutcome {
    /// Recommended CPU in cores (`approxCore`)
    pub cores: f64,
    /// Integral accumulator for the next step
    pub next_integral: f64,
    pub error: f64,
    pub proportional: f64,
    /// Integral term used for this step
    pub integral: f64,
    /// Unsaturated target utilization
    pub utilization: f64,
    /// Raw model inversion before clamping
    pub target_cores: f64,
    /// Utilization realized by `cores`
    pub realized_utilization: f64,
    /// The inversion hit its singularity and was saturated to `core_max`
    pub singular: bool,
    /// `cores` differs from `|target_cores|` because of clamping
    pub saturated: bool,
}

/// Discrete-time controller with anti-windup, parameterized by [`ControllerConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackController {
    config: ControllerConfig,
}

impl FeedbackController {
    pub fn new(config: ControllerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run one control step from `state` with the per-container CPU floor
    /// `core_min` (in cores).
    pub fn step(
        &self,
        state: &ControllerState,
        input: ControllerInput,
        core_min: f64,
    ) -> ControllerOutcome {
        let c = &self.config;
        let req = input.requests;

        let error = c.sla_ms / 1000.0 - input.response_time_ms / 1000.0;
        let proportional = (c.a - 1.0) / (c.p_nom - 1.0) * error;
        let integral = state.integral + (1.0 - c.p_nom) * proportional;
        let utilization = integral + proportional;

        let denominator = c.a1 - utilization;
        let singular = !(denominator.abs() > SINGULARITY_EPSILON);
        let target_cores = if singular {
            c.core_max
        } else {
            req * (utilization - c.a1 - 1000.0 * c.a2) / (1000.0 * c.a3 * denominator)
        };

        // min(max(..)) rather than clamp: core_max wins if the floor exceeds it
        let magnitude = target_cores.abs();
        let cores = if magnitude.is_finite() {
            magnitude.max(core_min).min(c.core_max)
        } else {
            c.core_max
        };
        let saturated = singular || cores != magnitude;

        let realized_utilization = self.forward_model(req, cores);
        // The forward model overflows for extreme request counts
        let next_integral = match realized_utilization - proportional {
            integral if integral.is_finite() => integral,
            _ => state.integral,
        };

        ControllerOutcome {
            cores,
            next_integral,
            error,
            proportional,
            integral,
            utilization,
            target_cores,
            realized_utilization,
            singular,
            saturated,
        }
    }

    /// Utilization implied by serving `req` requests with `cores` cores
    pub fn forward_model(&self, req: f64, cores: f64) -> f64 {
        let c = &self.config;
        let capacity = 1000.0 * c.a3 * cores;
        let denominator = req + capacity;
        if denominator.abs() <= SINGULARITY_EPSILON {
            // Limit of the model as req -> 0
            return c.a1;
        }
        ((1000.0 * c.a2 + c.a1) * req + c.a1 * capacity) / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORE_MIN: f64 = 0.025;

    fn controller() -> FeedbackController {
        FeedbackController::new(ControllerConfig::default())
    }

    fn run(
        controller: &FeedbackController,
        state: &mut ControllerState,
        input: ControllerInput,
    ) -> ControllerOutcome {
        let outcome = controller.step(state, input, CORE_MIN);
        state.integral = outcome.next_integral;
        outcome
    }

    #[test]
    fn test_regression_at_sla_from_zero_integral() {
        let c = ControllerConfig::default();
        let outcome = controller().step(
            &ControllerState::default(),
            ControllerInput {
                response_time_ms: 1000.0,
                requests: 10.0,
            },
            CORE_MIN,
        );

        assert_eq!(outcome.error, 0.0);
        assert_eq!(outcome.proportional, 0.0);
        assert_eq!(outcome.utilization, 0.0);

        let expected_target = 10.0 * (0.0 - c.a1 - 1000.0 * c.a2) / (1000.0 * c.a3 * (c.a1 - 0.0));
        assert!((outcome.target_cores - expected_target).abs() < 1e-9);
        assert!(outcome.target_cores < 0.0);

        let expected_core = expected_target.abs().max(CORE_MIN).min(c.core_max);
        assert!((outcome.cores - expected_core).abs() < 1e-9);
        assert!((outcome.cores - 0.197_746).abs() < 1e-6);
        assert!(!outcome.singular);
    }

    #[test]
    fn test_steady_state_converges() {
        let controller = controller();
        let mut state = ControllerState::default();
        let input = ControllerInput {
            response_time_ms: 1000.0,
            requests: 10.0,
        };

        let mut cores = Vec::new();
        for _ in 0..20 {
            cores.push(run(&controller, &mut state, input).cores);
        }

        // Settled after a couple of ticks and stays put
        let settled = cores[2];
        for c in &cores[2..] {
            assert!((c - settled).abs() < 1e-9, "cores drifted: {:?}", cores);
        }
        let outcome = run(&controller, &mut state, input);
        assert_eq!(outcome.error, 0.0);
        assert!((outcome.utilization - outcome.realized_utilization).abs() < 1e-9);
    }

    #[test]
    fn test_anti_windup_keeps_integral_bounded() {
        let controller = controller();
        let c = controller.config().clone();
        let mut state = ControllerState::default();
        // Response time far below SLA with heavy traffic: output pinned at core_max
        let input = ControllerInput {
            response_time_ms: 0.0,
            requests: 10_000.0,
        };

        let mut naive_integral = 0.0;
        for _ in 0..1000 {
            let outcome = run(&controller, &mut state, input);
            naive_integral += (1.0 - c.p_nom) * outcome.proportional;

            assert_eq!(outcome.cores, c.core_max);
            assert!(outcome.saturated);
            // Forward model output lies between a1 and a1 + 1000*a2
            let bound = (c.a1 + 1000.0 * c.a2).abs() + outcome.proportional.abs();
            assert!(state.integral.abs() <= bound, "integral {}", state.integral);
        }
        assert!(naive_integral > 100.0);
        assert!(state.integral.abs() < 5.0);
    }

    #[test]
    fn test_singular_inversion_saturates_to_core_max() {
        let c = ControllerConfig::default();
        let state = ControllerState {
            integral: c.a1,
            ..ControllerState::default()
        };
        let outcome = controller().step(
            &state,
            ControllerInput {
                response_time_ms: c.sla_ms,
                requests: 50.0,
            },
            CORE_MIN,
        );

        assert!(outcome.singular);
        assert_eq!(outcome.cores, c.core_max);
        assert!(outcome.next_integral.is_finite());
    }

    #[test]
    fn test_output_respects_floor_and_ceiling() {
        let controller = controller();
        let idle = controller.step(
            &ControllerState::default(),
            ControllerInput {
                response_time_ms: 1000.0,
                requests: 0.0,
            },
            CORE_MIN,
        );
        assert_eq!(idle.cores, CORE_MIN);
        assert!(idle.saturated);

        let slow = controller.step(
            &ControllerState::default(),
            ControllerInput {
                response_time_ms: 5000.0,
                requests: 100_000.0,
            },
            CORE_MIN,
        );
        assert!(slow.cores <= controller.config().core_max);
        assert!(slow.cores >= CORE_MIN);
    }

    #[test]
    fn test_zero_floor_and_zero_requests_stay_finite() {
        let outcome = controller().step(
            &ControllerState::default(),
            ControllerInput {
                response_time_ms: 1000.0,
                requests: 0.0,
            },
            0.0,
        );
        assert_eq!(outcome.cores, 0.0);
        assert_eq!(outcome.realized_utilization, ControllerConfig::default().a1);
        assert!(outcome.next_integral.is_finite());
    }

    #[test]
    fn test_extreme_request_count_keeps_previous_integral() {
        let c = ControllerConfig::default();
        let state = ControllerState {
            integral: 0.12,
            ..ControllerState::default()
        };
        let outcome = controller().step(
            &state,
            ControllerInput {
                response_time_ms: 1000.0,
                requests: 1e308,
            },
            CORE_MIN,
        );

        assert_eq!(outcome.cores, c.core_max);
        assert!(!outcome.realized_utilization.is_finite());
        assert_eq!(outcome.next_integral, 0.12);
    }

    #[test]
    fn test_step_does_not_mutate_state() {
        let state = ControllerState {
            integral: 0.3,
            request_baseline: 17.0,
            steps: 4,
        };
        let before = state;
        controller().step(
            &state,
            ControllerInput {
                response_time_ms: 250.0,
                requests: 5.0,
            },
            CORE_MIN,
        );
        assert_eq!(state, before);
    }
}
