use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    time::Instant,
};
use uuid::Uuid;

use crate::cards::{Card, Pack};

use super::{
    simulator::{CardTotal, PackSimulator, PullResult, Stats},
    SimulatorConfig, SimulatorError,
};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,

    #[error("session server has shut down")]
    Closed,

    #[error(transparent)]
    Simulator(#[from] SimulatorError),
}

type Reply<T> = oneshot::Sender<Option<T>>;

pub enum SessionRequest {
    Create {
        pack: Arc<Pack>,
        seed: Option<u64>,
        reply: oneshot::Sender<Uuid>,
    },
    Open {
        session: Uuid,
        force_rare: bool,
        reply: Reply<Result<PullResult, SimulatorError>>,
    },
    Reset(Uuid, Reply<()>),
    Stats(Uuid, Reply<Stats>),
    Totals(Uuid, Reply<Vec<CardTotal>>),
    CurrentPull(Uuid, Reply<Option<PullResult>>),
    History(Uuid, Reply<Vec<Card>>),
    Close(Uuid, Reply<()>),
}

struct Session {
    simulator: PackSimulator,
    touched: Instant,
}

/// Owns every live simulator. Requests are handled one at a time so each
/// simulator has a single writer. Sessions untouched for `idle_timeout` are
/// dropped.
struct SessionServer {
    config: SimulatorConfig,
    idle_timeout: Duration,
    chan: UnboundedReceiver<SessionRequest>,
    sessions: HashMap<Uuid, Session>,
}

impl SessionServer {
    async fn run(&mut self) {
        let mut sweep = tokio::time::interval(self.idle_timeout.max(Duration::from_secs(1)));
        loop {
            tokio::select! {
                req = self.chan.recv() => {
                    let Some(req) = req else {
                        break;
                    };
                    self.expire_idle();
                    self.handle(req);
                }
                _ = sweep.tick() => self.expire_idle(),
            }
        }
        tracing::debug!("Session server channel closed, stopping.");
    }

    fn expire_idle(&mut self) {
        let now = Instant::now();
        let before = self.sessions.len();
        let timeout = self.idle_timeout;
        self.sessions
            .retain(|_, session| now.duration_since(session.touched) < timeout);
        if self.sessions.len() < before {
            tracing::info!(
                "Expired {} idle sessions, {} remain.",
                before - self.sessions.len(),
                self.sessions.len()
            );
        }
    }

    /// Look up a session, marking it as used.
    fn session(&mut self, id: &Uuid) -> Option<&mut PackSimulator> {
        self.sessions.get_mut(id).map(|session| {
            session.touched = Instant::now();
            &mut session.simulator
        })
    }

    fn handle(&mut self, req: SessionRequest) {
        // A dropped receiver means the requester gave up, nothing to do.
        match req {
            SessionRequest::Create { pack, seed, reply } => {
                let id = Uuid::new_v4();
                tracing::info!("Starting session {id} for pack {}.", pack.id);
                let config = self.config.clone();
                let simulator = match seed {
                    Some(seed) => PackSimulator::seeded(pack, config, seed),
                    None => PackSimulator::from_entropy(pack, config),
                };
                self.sessions.insert(
                    id,
                    Session {
                        simulator,
                        touched: Instant::now(),
                    },
                );
                reply.send(id).ok();
            }
            SessionRequest::Open {
                session,
                force_rare,
                reply,
            } => {
                let result = self.session(&session).map(|sim| {
                    let result = sim.open_pack(force_rare);
                    match &result {
                        Ok(pull) => {
                            tracing::debug!("Session {session} opened a {:?} pack.", pull.pack_type)
                        }
                        Err(e) => tracing::warn!(
                            "Session {session} failed to open pack {}: {e}",
                            sim.pack().id
                        ),
                    }
                    result
                });
                reply.send(result).ok();
            }
            SessionRequest::Reset(session, reply) => {
                let result = self.session(&session).map(|sim| sim.reset_session());
                reply.send(result).ok();
            }
            SessionRequest::Stats(session, reply) => {
                reply
                    .send(self.session(&session).map(|sim| sim.statistics()))
                    .ok();
            }
            SessionRequest::Totals(session, reply) => {
                reply
                    .send(
                        self.session(&session)
                            .map(|sim| sim.aggregate_pull_history()),
                    )
                    .ok();
            }
            SessionRequest::CurrentPull(session, reply) => {
                reply
                    .send(
                        self.session(&session)
                            .map(|sim| sim.current_pull().cloned()),
                    )
                    .ok();
            }
            SessionRequest::History(session, reply) => {
                reply
                    .send(self.session(&session).map(|sim| sim.history().to_vec()))
                    .ok();
            }
            SessionRequest::Close(session, reply) => {
                let removed = self.sessions.remove(&session).map(|_| ());
                if removed.is_some() {
                    tracing::info!("Closed session {session}.");
                }
                reply.send(removed).ok();
            }
        }
    }
}

/// Cloneable handle for talking to the session server task.
#[derive(Clone)]
pub struct SessionHandle {
    chan: UnboundedSender<SessionRequest>,
}

impl SessionHandle {
    /// Spawn the session server on the current runtime.
    pub fn spawn(config: SimulatorConfig) -> Self {
        let idle_timeout = Duration::from_secs(config.session_idle_secs);
        Self::spawn_with_idle_timeout(config, idle_timeout)
    }

    pub fn spawn_with_idle_timeout(config: SimulatorConfig, idle_timeout: Duration) -> Self {
        let (tx, rx) = unbounded_channel();
        let mut server = SessionServer {
            config,
            idle_timeout,
            chan: rx,
            sessions: HashMap::new(),
        };
        tokio::spawn(async move { server.run().await });
        Self { chan: tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> SessionRequest,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.chan.send(make(tx)).map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    async fn query<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionRequest,
    ) -> Result<T, SessionError> {
        self.request(make).await?.ok_or(SessionError::NotFound)
    }

    pub async fn create(&self, pack: Arc<Pack>, seed: Option<u64>) -> Result<Uuid, SessionError> {
        self.request(|reply| SessionRequest::Create { pack, seed, reply })
            .await
    }

    pub async fn open(&self, session: Uuid, force_rare: bool) -> Result<PullResult, SessionError> {
        Ok(self
            .query(|reply| SessionRequest::Open {
                session,
                force_rare,
                reply,
            })
            .await??)
    }

    pub async fn reset(&self, session: Uuid) -> Result<(), SessionError> {
        self.query(|reply| SessionRequest::Reset(session, reply))
            .await
    }

    pub async fn stats(&self, session: Uuid) -> Result<Stats, SessionError> {
        self.query(|reply| SessionRequest::Stats(session, reply))
            .await
    }

    pub async fn totals(&self, session: Uuid) -> Result<Vec<CardTotal>, SessionError> {
        self.query(|reply| SessionRequest::Totals(session, reply))
            .await
    }

    pub async fn current_pull(&self, session: Uuid) -> Result<Option<PullResult>, SessionError> {
        self.query(|reply| SessionRequest::CurrentPull(session, reply))
            .await
    }

    pub async fn history(&self, session: Uuid) -> Result<Vec<Card>, SessionError> {
        self.query(|reply| SessionRequest::History(session, reply))
            .await
    }

    pub async fn close(&self, session: Uuid) -> Result<(), SessionError> {
        self.query(|reply| SessionRequest::Close(session, reply))
            .await
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use uuid::Uuid;

    use crate::{
        cards::{Card, Pack, PackSlotEntry, Slot},
        sim::{PackType, SimulatorConfig, SimulatorError},
    };

    use super::{SessionError, SessionHandle};

    fn rare_only_pack() -> Arc<Pack> {
        Arc::new(Pack {
            id: "rare-only".to_string(),
            name: "Rare Only".to_string(),
            entries: vec![PackSlotEntry {
                card: Card::sample(7),
                pool: Slot::RarePack.pool(),
                slot: Slot::RarePack,
                percent: 100.0,
            }],
        })
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let handle = SessionHandle::spawn(SimulatorConfig::default());
        let id = handle.create(rare_only_pack(), Some(1)).await.unwrap();

        assert_eq!(handle.current_pull(id).await.unwrap(), None);
        let pull = handle.open(id, true).await.unwrap();
        assert_eq!(pull.pack_type, PackType::Rare);
        assert_eq!(handle.current_pull(id).await.unwrap(), Some(pull));

        let stats = handle.stats(id).await.unwrap();
        assert_eq!(stats.rare_count, 1);
        assert_eq!(stats.pack_points, 5);
        assert_eq!(handle.history(id).await.unwrap().len(), 5);
        assert_eq!(handle.totals(id).await.unwrap()[0].quantity, 5);

        handle.reset(id).await.unwrap();
        assert_eq!(handle.stats(id).await.unwrap().total_packs, 0);
        assert!(handle.history(id).await.unwrap().is_empty());

        handle.close(id).await.unwrap();
        assert_eq!(handle.stats(id).await, Err(SessionError::NotFound));
        assert_eq!(handle.close(id).await, Err(SessionError::NotFound));
    }

    #[tokio::test]
    async fn test_session_errors() {
        let handle = SessionHandle::spawn(SimulatorConfig {
            rare_threshold: 0,
            ..Default::default()
        });
        let id = handle.create(rare_only_pack(), None).await.unwrap();

        // Regular packs cannot be drawn from a pack with only a rare pool.
        assert_eq!(
            handle.open(id, false).await,
            Err(SessionError::Simulator(SimulatorError::EmptySlot {
                slot: Slot::First
            }))
        );
        assert_eq!(handle.stats(id).await.unwrap().total_packs, 0);

        assert_eq!(
            handle.open(Uuid::new_v4(), true).await,
            Err(SessionError::NotFound)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_expire() {
        let handle = SessionHandle::spawn_with_idle_timeout(
            SimulatorConfig::default(),
            Duration::from_secs(60),
        );
        let pack = rare_only_pack();
        let active = handle.create(pack.clone(), Some(1)).await.unwrap();
        let idle = handle.create(pack.clone(), Some(2)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(40)).await;
        handle.open(active, true).await.unwrap();
        tokio::time::sleep(Duration::from_secs(40)).await;

        assert_eq!(handle.stats(idle).await, Err(SessionError::NotFound));
        assert_eq!(handle.stats(active).await.unwrap().rare_count, 1);

        // Expired sessions release their share of the pack.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(handle.history(active).await, Err(SessionError::NotFound));
        assert_eq!(Arc::strong_count(&pack), 1);
    }
}
