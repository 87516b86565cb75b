// Deterministic sample-data seeder for demos and local development. A fixed
// RNG seed makes repeated runs produce the same graph.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::info;

use crate::core::{current_time_millis, IdGenerator, PostId, UserId};
use crate::entities::{EntPost, EntUser, Privacy, Visibility};
use crate::error::AppResult;
use crate::graph::FollowGraph;
use crate::store::{insert_entity, save_entity_cas, EntityStore, Versioned};

const RNG_SEED: u64 = 0x5eed;
const DAY_MS: i64 = 86_400_000;

const SAMPLE_NAMES: &[&str] = &[
    "Ada Lovelace",
    "Grace Hopper",
    "Alan Turing",
    "Katherine Johnson",
    "Edsger Dijkstra",
    "Barbara Liskov",
    "Donald Knuth",
    "Margaret Hamilton",
];

const SAMPLE_CONTENT: &[&str] = &[
    "Just shipped a new release, feedback welcome!",
    "Hot take: pagination bugs cause more incidents than race conditions.",
    "Reading about log-structured storage this weekend.",
    "Anyone else benchmarking their feed queries lately?",
    "Today I learned about compare-and-swap loops.",
    "New blog post on visibility rules in social graphs.",
];

const SAMPLE_TAGS: &[&str] = &["rust", "databases", "feeds", "distsys", "til"];

pub struct DataSeeder {
    store: Arc<dyn EntityStore>,
    graph: Arc<FollowGraph>,
    ids: Arc<IdGenerator>,
}

impl DataSeeder {
    pub fn new(
        store: Arc<dyn EntityStore>,
        graph: Arc<FollowGraph>,
        ids: Arc<IdGenerator>,
    ) -> Self {
        Self { store, graph, ids }
    }

    /// Seed users, a follow graph, posts and likes. Returns a short summary.
    pub async fn seed(&self) -> AppResult<String> {
        let mut rng = StdRng::seed_from_u64(RNG_SEED);
        let now = current_time_millis();

        let users = self.seed_users(now).await?;
        let follows = self.seed_follows(&mut rng, &users).await?;
        let posts = self.seed_posts(&mut rng, &users, now).await?;

        let summary = format!(
            "{} users, {} follow edges, {} posts",
            users.len(),
            follows,
            posts
        );
        info!("data seeder finished: {}", summary);
        Ok(summary)
    }

    async fn seed_users(&self, now: i64) -> AppResult<Vec<UserId>> {
        let mut ids = Vec::with_capacity(SAMPLE_NAMES.len());
        for (index, name) in SAMPLE_NAMES.iter().enumerate() {
            let id = UserId::new(self.ids.next_id());
            let mut user = EntUser::new(id, name, now)?
                .with_bio("Seeded sample account")?;
            // A couple of non-public profiles to exercise the browse gate.
            user = match index % 4 {
                1 => user.with_privacy(Privacy::Friends),
                3 => user.with_privacy(Privacy::Private),
                _ => user,
            };
            insert_entity(self.store.as_ref(), &user, now).await?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn seed_follows(&self, rng: &mut StdRng, users: &[UserId]) -> AppResult<usize> {
        let mut edges = 0;
        for &follower in users {
            let count = rng.random_range(1..=3);
            for _ in 0..count {
                let target = users[rng.random_range(0..users.len())];
                if target == follower {
                    continue;
                }
                let toggle = self.graph.toggle_follow(follower, target).await?;
                if toggle.now_following {
                    edges += 1;
                } else {
                    // The random pair collided with an existing edge and the
                    // toggle removed it; put it back.
                    self.graph.toggle_follow(follower, target).await?;
                }
            }
        }
        Ok(edges)
    }

    async fn seed_posts(
        &self,
        rng: &mut StdRng,
        users: &[UserId],
        now: i64,
    ) -> AppResult<usize> {
        let mut total = 0;
        for &author in users {
            let count = rng.random_range(1..=3);
            for _ in 0..count {
                let id = PostId::new(self.ids.next_id());
                let created = now - rng.random_range(0..14) * DAY_MS;
                let content = SAMPLE_CONTENT[rng.random_range(0..SAMPLE_CONTENT.len())];
                let visibility = match rng.random_range(0..5) {
                    0 => Visibility::Friends,
                    _ => Visibility::Public,
                };
                let tags = vec![SAMPLE_TAGS[rng.random_range(0..SAMPLE_TAGS.len())].to_string()];

                let mut post =
                    EntPost::new(id, author, content, None, tags, visibility, created)?;
                for &liker in users {
                    if liker != author && rng.random_bool(0.3) {
                        post.toggle_like(liker, created);
                    }
                }
                insert_entity(self.store.as_ref(), &post, created).await?;
                self.bump_posts_count(author, created).await?;
                total += 1;
            }
        }
        Ok(total)
    }

    async fn bump_posts_count(&self, author: UserId, now: i64) -> AppResult<()> {
        if let Some(Versioned { mut entity, version }) =
            crate::store::load_versioned::<EntUser>(self.store.as_ref(), author.value()).await?
        {
            entity.record_post_created(now);
            save_entity_cas(self.store.as_ref(), &entity, version, now).await?;
        }
        Ok(())
    }
}
