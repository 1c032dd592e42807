use std::collections::HashMap;

use futures_util::{stream, Stream, TryStreamExt};
use kube::runtime::watcher::Event;
use kube::Resource;

/// A typed resource lifecycle event.
///
/// The kube watcher only distinguishes applied from deleted; an update is
/// derived from a per-loop last-seen cache so handlers always receive the
/// `(old, new)` snapshot pair.
#[derive(Debug, Clone)]
pub enum LifecycleEvent<K> {
    Added(K),
    Updated { old: K, new: K },
    Deleted(K),
}

type Key = (Option<String>, Option<String>);

fn key<K: Resource>(obj: &K) -> Key {
    (obj.meta().namespace.clone(), obj.meta().name.clone())
}

/// Split a raw watcher stream into lifecycle events, in delivery order. A
/// `Restarted` list re-primes the cache and replays every object as `Added`.
pub fn lifecycle_events<K, E>(
    events: impl Stream<Item = Result<Event<K>, E>>,
) -> impl Stream<Item = Result<LifecycleEvent<K>, E>>
where
    K: Resource + Clone,
{
    let mut last_seen: HashMap<Key, K> = HashMap::new();

    events
        .map_ok(move |event| {
            let out = match event {
                Event::Applied(obj) => match last_seen.insert(key(&obj), obj.clone()) {
                    Some(old) => vec![LifecycleEvent::Updated { old, new: obj }],
                    None => vec![LifecycleEvent::Added(obj)],
                },

                Event::Deleted(obj) => {
                    last_seen.remove(&key(&obj));

                    vec![LifecycleEvent::Deleted(obj)]
                }

                Event::Restarted(objs) => {
                    last_seen.clear();

                    objs.into_iter()
                        .map(|obj| {
                            last_seen.insert(key(&obj), obj.clone());

                            LifecycleEvent::Added(obj)
                        })
                        .collect()
                }
            };

            stream::iter(out.into_iter().map(Ok))
        })
        .try_flatten()
}
