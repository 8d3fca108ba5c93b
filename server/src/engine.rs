//! Protocol engine for the datagram channel
//!
//! Decodes each request, reconciles the player's clock, applies the verb's
//! state transition on the registry and builds the reply. Every request for a
//! player goes through here in receipt order.

use crate::registry::{Reconcile, SessionRegistry};
use crate::store::{GameStore, TrialRecord};
use chrono::{DateTime, Local};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::protocol::Verb;
use shared::{evaluate, Code, EndStatus, GameConfig, GameMode, PlayerId, Request, Response, Status};

pub struct Engine<S: GameStore> {
    pub(crate) registry: SessionRegistry<S>,
    pub(crate) rules: GameConfig,
    rng: StdRng,
    /// Number of scoreboards handed out, used to name the transfers
    pub(crate) scoreboards_served: u32,
}

impl<S: GameStore> Engine<S> {
    pub fn new(store: S, rules: GameConfig) -> Self {
        Self::with_rng(store, rules, StdRng::from_entropy())
    }

    pub fn with_rng(store: S, rules: GameConfig, rng: StdRng) -> Self {
        Self {
            registry: SessionRegistry::new(store),
            rules,
            rng,
            scoreboards_served: 0,
        }
    }

    /// Decodes and answers one datagram
    ///
    /// Undecodable input never reaches the registry.
    pub fn handle_datagram(&mut self, data: &[u8], now: DateTime<Local>) -> Response {
        let line = match std::str::from_utf8(data) {
            Ok(line) => line,
            Err(_) => {
                debug!("Dropping non UTF-8 datagram ({} bytes)", data.len());
                return Response::Unknown;
            }
        };

        match Request::parse(line, &self.rules) {
            Ok(request) => self.handle_request(request, now),
            Err(e) => {
                debug!("Rejected request {:?}: {}", line.trim_end(), e);
                Response::syntax_error(e.verb)
            }
        }
    }

    pub fn handle_request(&mut self, request: Request, now: DateTime<Local>) -> Response {
        match request {
            Request::Start { plid, time } => self.start(plid, time, GameMode::Play, None, now),
            Request::Debug { plid, time, secret } => {
                self.start(plid, time, GameMode::Debug, Some(secret), now)
            }
            Request::Try { plid, guess, trial } => self.try_guess(plid, guess, trial, now),
            Request::Quit { plid } => self.quit(plid, now),
        }
    }

    fn start(
        &mut self,
        plid: PlayerId,
        time: u32,
        mode: GameMode,
        secret: Option<Code>,
        now: DateTime<Local>,
    ) -> Response {
        let verb = match mode {
            GameMode::Play => Verb::Start,
            GameMode::Debug => Verb::Debug,
        };

        if let Reconcile::Active = self.registry.reconcile_time(plid, now) {
            debug!("Player {} already has a game in progress", plid);
            return Response::Status(verb, Status::Nok);
        }

        let secret = secret.unwrap_or_else(|| self.random_secret());
        self.registry.create_or_get(plid, time, mode, secret, now);
        Response::Status(verb, Status::Ok)
    }

    fn try_guess(
        &mut self,
        plid: PlayerId,
        guess: Code,
        trial: u32,
        now: DateTime<Local>,
    ) -> Response {
        match self.registry.reconcile_time(plid, now) {
            Reconcile::NoSession => return Response::Status(Verb::Try, Status::Nok),
            Reconcile::Expired(session) => {
                return Response::Reveal {
                    verb: Verb::Try,
                    status: Status::Etm,
                    secret: session.secret,
                }
            }
            Reconcile::Active => {}
        }

        let max_trials = self.rules.max_trials;
        let code_len = self.rules.code_len;
        let session = match self.registry.get_mut(plid) {
            Some(session) => session,
            None => return Response::Status(Verb::Try, Status::Nok),
        };

        let repeats_last = session.last_guess.as_ref() == Some(&guess);

        // The previous reply was lost: answer again without scoring twice.
        if repeats_last && session.expected_trial.checked_sub(1) == Some(trial) {
            debug!("Player {} retransmitted trial {}", plid, trial);
            return Response::Scored {
                trial,
                feedback: evaluate(&guess, &session.secret),
            };
        }
        if trial != session.current_trial {
            debug!(
                "Player {} sent trial {}, expected {}",
                plid, trial, session.current_trial
            );
            return Response::Status(Verb::Try, Status::Inv);
        }
        if repeats_last {
            return Response::Status(Verb::Try, Status::Dup);
        }

        let feedback = evaluate(&guess, &session.secret);
        let record = TrialRecord {
            guess: guess.clone(),
            feedback,
            elapsed_secs: session.elapsed_secs,
        };
        session.last_guess = Some(guess);

        let solved = feedback.is_solved(code_len);
        let exhausted = session.current_trial >= max_trials;
        if !solved && !exhausted {
            session.current_trial += 1;
            session.expected_trial += 1;
        }

        self.registry.record_trial(plid, &record);

        if solved {
            self.registry.remove(plid, EndStatus::Win, now);
            return Response::Scored { trial, feedback };
        }
        if exhausted {
            info!("Player {} ran out of trials", plid);
            return match self.registry.remove(plid, EndStatus::Fail, now) {
                Some(session) => Response::Reveal {
                    verb: Verb::Try,
                    status: Status::Ent,
                    secret: session.secret,
                },
                None => Response::Status(Verb::Try, Status::Nok),
            };
        }
        Response::Scored { trial, feedback }
    }

    fn quit(&mut self, plid: PlayerId, now: DateTime<Local>) -> Response {
        match self.registry.reconcile_time(plid, now) {
            Reconcile::Active => match self.registry.remove(plid, EndStatus::Quit, now) {
                Some(session) => Response::Reveal {
                    verb: Verb::Quit,
                    status: Status::Ok,
                    secret: session.secret,
                },
                None => Response::Status(Verb::Quit, Status::Nok),
            },
            Reconcile::NoSession | Reconcile::Expired(_) => {
                Response::Status(Verb::Quit, Status::Nok)
            }
        }
    }

    fn random_secret(&mut self) -> Code {
        let symbols = self.rules.alphabet.symbols();
        let secret = (0..self.rules.code_len)
            .map(|_| symbols[self.rng.gen_range(0..symbols.len())])
            .collect();
        Code::new(secret)
    }

    pub fn registry(&self) -> &SessionRegistry<S> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SessionRegistry<S> {
        &mut self.registry
    }

    pub fn rules(&self) -> &GameConfig {
        &self.rules
    }
}
