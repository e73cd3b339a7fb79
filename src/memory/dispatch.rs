//! Command execution against a `Keyspace`
//!
//! Every command runs to completion under the caller's write lock, which is
//! what makes RPOPLPUSH, SMOVE and the *STORE family atomic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Bound;
use std::time::Duration;

use rand::seq::{IndexedRandom, IteratorRandom};

use super::keyspace::{Entry, Keyspace, RedisValue, StoreError, StoreResult, glob_match};
use super::zset::SortedSet;
use crate::connection::Reply;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Left,
    Right,
}

/// Runs one non-blocking command.
pub fn apply(ks: &mut Keyspace, name: &str, args: &[Vec<u8>]) -> StoreResult<Reply> {
    let cmd = name.to_ascii_uppercase();
    match cmd.as_str() {
        // ==================== keys ====================
        "PING" => Ok(Reply::Status("PONG".to_string())),
        "DEL" => {
            min_args(&cmd, args, 1)?;
            let removed = args.iter().filter(|k| ks.remove(k).is_some()).count();
            Ok(Reply::Int(removed as i64))
        }
        "EXISTS" => {
            min_args(&cmd, args, 1)?;
            Ok(Reply::Int(args.iter().filter(|k| ks.exists(k)).count() as i64))
        }
        "TYPE" => {
            exact_args(&cmd, args, 1)?;
            let name = ks.entry(&args[0]).map_or("none", |e| e.value.type_name());
            Ok(Reply::Status(name.to_string()))
        }
        "EXPIRE" | "PEXPIRE" => {
            exact_args(&cmd, args, 2)?;
            let amount = parse_i64(&args[1])?.max(0) as u64;
            let ttl = if cmd == "EXPIRE" {
                Duration::from_secs(amount)
            } else {
                Duration::from_millis(amount)
            };
            Ok(Reply::from_bool(match ks.remove(&args[0]) {
                Some(entry) => {
                    ks.insert(args[0].clone(), Entry::with_ttl(entry.value, ttl));
                    true
                }
                None => false,
            }))
        }
        "PERSIST" => {
            exact_args(&cmd, args, 1)?;
            Ok(Reply::from_bool(match ks.entry_mut(&args[0]) {
                Some(entry) => entry.expire_at.take().is_some(),
                None => false,
            }))
        }
        "TTL" | "PTTL" => {
            exact_args(&cmd, args, 1)?;
            let millis = match ks.entry(&args[0]) {
                None => return Ok(Reply::Int(-2)),
                Some(e) => e.ttl_millis(),
            };
            if millis < 0 || cmd == "PTTL" {
                Ok(Reply::Int(millis))
            } else {
                Ok(Reply::Int((millis + 500) / 1000))
            }
        }
        "DBSIZE" => Ok(Reply::Int(ks.len() as i64)),
        "FLUSHDB" => {
            ks.clear();
            Ok(Reply::ok())
        }

        // ==================== strings ====================
        "GET" => {
            exact_args(&cmd, args, 1)?;
            Ok(opt_bulk(ks.string(&args[0])?.cloned()))
        }
        "SET" => set(ks, &cmd, args),
        "SETNX" => {
            exact_args(&cmd, args, 2)?;
            if ks.exists(&args[0]) {
                return Ok(Reply::Int(0));
            }
            ks.insert(args[0].clone(), Entry::new(RedisValue::String(args[1].clone())));
            Ok(Reply::Int(1))
        }
        "GETSET" => {
            exact_args(&cmd, args, 2)?;
            let old = ks.string(&args[0])?.cloned();
            ks.insert(args[0].clone(), Entry::new(RedisValue::String(args[1].clone())));
            Ok(opt_bulk(old))
        }
        "APPEND" => {
            exact_args(&cmd, args, 2)?;
            let value = ks.string_or_create(&args[0])?;
            value.extend_from_slice(&args[1]);
            Ok(Reply::Int(value.len() as i64))
        }
        "STRLEN" => {
            exact_args(&cmd, args, 1)?;
            Ok(Reply::Int(ks.string(&args[0])?.map_or(0, Vec::len) as i64))
        }
        "MGET" => {
            min_args(&cmd, args, 1)?;
            // wrong-typed keys read as nil here
            Ok(Reply::Array(
                args.iter()
                    .map(|k| opt_bulk(ks.string(k).ok().flatten().cloned()))
                    .collect(),
            ))
        }
        "MSET" => {
            if args.is_empty() || args.len() % 2 != 0 {
                return Err(StoreError::WrongArity(cmd.to_lowercase()));
            }
            for pair in args.chunks(2) {
                ks.insert(pair[0].clone(), Entry::new(RedisValue::String(pair[1].clone())));
            }
            Ok(Reply::ok())
        }
        "INCR" | "DECR" | "INCRBY" | "DECRBY" => {
            let delta = match cmd.as_str() {
                "INCR" | "DECR" => {
                    exact_args(&cmd, args, 1)?;
                    1
                }
                _ => {
                    exact_args(&cmd, args, 2)?;
                    parse_i64(&args[1])?
                }
            };
            let delta = if cmd.starts_with("DECR") { -delta } else { delta };
            let current = match ks.string(&args[0])? {
                Some(v) => parse_i64(v)?,
                None => 0,
            };
            let next = current.checked_add(delta).ok_or(StoreError::NotInteger)?;
            store_string(ks, &args[0], next.to_string().into_bytes());
            Ok(Reply::Int(next))
        }
        "INCRBYFLOAT" => {
            exact_args(&cmd, args, 2)?;
            let delta = parse_f64(&args[1])?;
            let current = match ks.string(&args[0])? {
                Some(v) => parse_f64(v)?,
                None => 0.0,
            };
            let next = finite(current + delta)?;
            let text = next.to_string().into_bytes();
            store_string(ks, &args[0], text.clone());
            Ok(Reply::Bulk(text))
        }

        // ==================== hashes ====================
        "HSET" | "HMSET" => {
            if args.len() < 3 || args.len() % 2 == 0 {
                return Err(StoreError::WrongArity(cmd.to_lowercase()));
            }
            let hash = ks.hash_or_create(&args[0])?;
            let added = args[1..]
                .chunks(2)
                .filter(|fv| hash.insert(fv[0].clone(), fv[1].clone()).is_none())
                .count();
            if cmd == "HMSET" {
                Ok(Reply::ok())
            } else {
                Ok(Reply::Int(added as i64))
            }
        }
        "HSETNX" => {
            exact_args(&cmd, args, 3)?;
            let hash = ks.hash_or_create(&args[0])?;
            if hash.contains_key(&args[1]) {
                return Ok(Reply::Int(0));
            }
            hash.insert(args[1].clone(), args[2].clone());
            Ok(Reply::Int(1))
        }
        "HGET" => {
            exact_args(&cmd, args, 2)?;
            Ok(opt_bulk(ks.hash(&args[0])?.and_then(|h| h.get(&args[1]).cloned())))
        }
        "HMGET" => {
            min_args(&cmd, args, 2)?;
            let hash = ks.hash(&args[0])?;
            Ok(Reply::Array(
                args[1..]
                    .iter()
                    .map(|f| opt_bulk(hash.and_then(|h| h.get(f).cloned())))
                    .collect(),
            ))
        }
        "HGETALL" | "HKEYS" | "HVALS" => {
            exact_args(&cmd, args, 1)?;
            let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = ks
                .hash(&args[0])?
                .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
                .unwrap_or_default();
            pairs.sort();
            let items = pairs.into_iter().flat_map(|(f, v)| match cmd.as_str() {
                "HKEYS" => vec![f],
                "HVALS" => vec![v],
                _ => vec![f, v],
            });
            Ok(bulk_array(items))
        }
        "HLEN" => {
            exact_args(&cmd, args, 1)?;
            Ok(Reply::Int(ks.hash(&args[0])?.map_or(0, HashMap::len) as i64))
        }
        "HEXISTS" => {
            exact_args(&cmd, args, 2)?;
            Ok(Reply::from_bool(
                ks.hash(&args[0])?.is_some_and(|h| h.contains_key(&args[1])),
            ))
        }
        "HSTRLEN" => {
            exact_args(&cmd, args, 2)?;
            let len = ks
                .hash(&args[0])?
                .and_then(|h| h.get(&args[1]))
                .map_or(0, Vec::len);
            Ok(Reply::Int(len as i64))
        }
        "HDEL" => {
            min_args(&cmd, args, 2)?;
            let removed = match ks.hash_mut(&args[0])? {
                Some(h) => args[1..].iter().filter(|f| h.remove(*f).is_some()).count(),
                None => 0,
            };
            ks.drop_if_empty(&args[0]);
            Ok(Reply::Int(removed as i64))
        }
        "HINCRBY" => {
            exact_args(&cmd, args, 3)?;
            let delta = parse_i64(&args[2])?;
            let hash = ks.hash_or_create(&args[0])?;
            let current = match hash.get(&args[1]) {
                Some(v) => parse_i64(v)?,
                None => 0,
            };
            let next = current.checked_add(delta).ok_or(StoreError::NotInteger)?;
            hash.insert(args[1].clone(), next.to_string().into_bytes());
            Ok(Reply::Int(next))
        }
        "HINCRBYFLOAT" => {
            exact_args(&cmd, args, 3)?;
            let delta = parse_f64(&args[2])?;
            let hash = ks.hash_or_create(&args[0])?;
            let current = match hash.get(&args[1]) {
                Some(v) => parse_f64(v)?,
                None => 0.0,
            };
            let text = finite(current + delta)?.to_string().into_bytes();
            hash.insert(args[1].clone(), text.clone());
            Ok(Reply::Bulk(text))
        }
        "HSCAN" => hscan(ks, &cmd, args),

        // ==================== lists ====================
        "LPUSH" | "RPUSH" | "LPUSHX" | "RPUSHX" => {
            min_args(&cmd, args, 2)?;
            let only_existing = cmd.ends_with('X');
            let list = if only_existing {
                match ks.list_mut(&args[0])? {
                    Some(list) => list,
                    None => return Ok(Reply::Int(0)),
                }
            } else {
                ks.list_or_create(&args[0])?
            };
            for v in &args[1..] {
                if cmd.starts_with('L') {
                    list.push_front(v.clone());
                } else {
                    list.push_back(v.clone());
                }
            }
            Ok(Reply::Int(list.len() as i64))
        }
        "LINSERT" => {
            exact_args(&cmd, args, 4)?;
            let after = match args[1].to_ascii_uppercase().as_slice() {
                b"BEFORE" => false,
                b"AFTER" => true,
                _ => return Err(StoreError::Syntax),
            };
            let Some(list) = ks.list_mut(&args[0])? else {
                return Ok(Reply::Int(0));
            };
            match list.iter().position(|v| *v == args[2]) {
                Some(pos) => {
                    list.insert(if after { pos + 1 } else { pos }, args[3].clone());
                    Ok(Reply::Int(list.len() as i64))
                }
                None => Ok(Reply::Int(-1)),
            }
        }
        "LPOP" | "RPOP" => {
            exact_args(&cmd, args, 1)?;
            let end = if cmd == "LPOP" { End::Left } else { End::Right };
            Ok(opt_bulk(pop(ks, &args[0], end)?))
        }
        "RPOPLPUSH" => {
            exact_args(&cmd, args, 2)?;
            Ok(opt_bulk(rpoplpush(ks, &args[0], &args[1])?))
        }
        "LINDEX" => {
            exact_args(&cmd, args, 2)?;
            let index = parse_i64(&args[1])?;
            let value = ks.list(&args[0])?.and_then(|list| {
                resolve_index(list.len(), index).and_then(|i| list.get(i).cloned())
            });
            Ok(opt_bulk(value))
        }
        "LSET" => {
            exact_args(&cmd, args, 3)?;
            let index = parse_i64(&args[1])?;
            let list = ks.list_mut(&args[0])?.ok_or(StoreError::NoSuchKey)?;
            let i = resolve_index(list.len(), index).ok_or(StoreError::IndexOutOfRange)?;
            list[i] = args[2].clone();
            Ok(Reply::ok())
        }
        "LLEN" => {
            exact_args(&cmd, args, 1)?;
            Ok(Reply::Int(ks.list(&args[0])?.map_or(0, VecDeque::len) as i64))
        }
        "LRANGE" => {
            exact_args(&cmd, args, 3)?;
            let (start, stop) = (parse_i64(&args[1])?, parse_i64(&args[2])?);
            let items: Vec<Vec<u8>> = match ks.list(&args[0])? {
                Some(list) => match normalize_range(list.len(), start, stop) {
                    Some((s, e)) => list.range(s..=e).cloned().collect(),
                    None => Vec::new(),
                },
                None => Vec::new(),
            };
            Ok(bulk_array(items))
        }
        "LTRIM" => {
            exact_args(&cmd, args, 3)?;
            let (start, stop) = (parse_i64(&args[1])?, parse_i64(&args[2])?);
            if let Some(list) = ks.list_mut(&args[0])? {
                match normalize_range(list.len(), start, stop) {
                    Some((s, e)) => {
                        list.truncate(e + 1);
                        list.drain(..s);
                    }
                    None => list.clear(),
                }
            }
            ks.drop_if_empty(&args[0]);
            Ok(Reply::ok())
        }
        "LREM" => {
            exact_args(&cmd, args, 3)?;
            let count = parse_i64(&args[1])?;
            let removed = match ks.list_mut(&args[0])? {
                Some(list) => lrem(list, count, &args[2]),
                None => 0,
            };
            ks.drop_if_empty(&args[0]);
            Ok(Reply::Int(removed as i64))
        }

        // ==================== sets ====================
        "SADD" => {
            min_args(&cmd, args, 2)?;
            let set = ks.set_or_create(&args[0])?;
            let added = args[1..].iter().filter(|m| set.insert((*m).clone())).count();
            Ok(Reply::Int(added as i64))
        }
        "SREM" => {
            min_args(&cmd, args, 2)?;
            let removed = match ks.set_mut(&args[0])? {
                Some(set) => args[1..].iter().filter(|m| set.remove(*m)).count(),
                None => 0,
            };
            ks.drop_if_empty(&args[0]);
            Ok(Reply::Int(removed as i64))
        }
        "SCARD" => {
            exact_args(&cmd, args, 1)?;
            Ok(Reply::Int(ks.set(&args[0])?.map_or(0, HashSet::len) as i64))
        }
        "SMEMBERS" => {
            exact_args(&cmd, args, 1)?;
            let members = ks.set(&args[0])?.cloned().unwrap_or_default();
            Ok(sorted_bulk_array(members))
        }
        "SISMEMBER" => {
            exact_args(&cmd, args, 2)?;
            Ok(Reply::from_bool(
                ks.set(&args[0])?.is_some_and(|s| s.contains(&args[1])),
            ))
        }
        "SMOVE" => {
            exact_args(&cmd, args, 3)?;
            ks.check_type(&args[1], "set")?;
            let moved = match ks.set_mut(&args[0])? {
                Some(src) => src.remove(&args[2]),
                None => false,
            };
            if moved {
                ks.drop_if_empty(&args[0]);
                ks.set_or_create(&args[1])?.insert(args[2].clone());
            }
            Ok(Reply::from_bool(moved))
        }
        "SPOP" => {
            if args.is_empty() || args.len() > 2 {
                return Err(StoreError::WrongArity(cmd.to_lowercase()));
            }
            let count = match args.get(1) {
                Some(c) => Some(parse_count(c)?),
                None => None,
            };
            let mut rng = rand::rng();
            let popped: Vec<Vec<u8>> = match ks.set_mut(&args[0])? {
                Some(set) => {
                    let wanted = count.unwrap_or(1).min(set.len());
                    let picked: Vec<Vec<u8>> = set.iter().cloned().choose_multiple(&mut rng, wanted);
                    for m in &picked {
                        set.remove(m);
                    }
                    picked
                }
                None => Vec::new(),
            };
            ks.drop_if_empty(&args[0]);
            match count {
                Some(_) => Ok(bulk_array(popped)),
                None => Ok(opt_bulk(popped.into_iter().next())),
            }
        }
        "SRANDMEMBER" => {
            exact_args(&cmd, args, 1)?;
            let members: Vec<Vec<u8>> = ks
                .set(&args[0])?
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default();
            Ok(opt_bulk(members.choose(&mut rand::rng()).cloned()))
        }
        "SDIFF" | "SINTER" | "SUNION" => {
            min_args(&cmd, args, 1)?;
            let result = set_algebra(ks, &cmd, args)?;
            Ok(sorted_bulk_array(result))
        }
        "SDIFFSTORE" | "SINTERSTORE" | "SUNIONSTORE" => {
            min_args(&cmd, args, 2)?;
            let result = set_algebra(ks, &cmd[..cmd.len() - "STORE".len()], &args[1..])?;
            let len = result.len();
            ks.remove(&args[0]);
            if len > 0 {
                ks.insert(args[0].clone(), Entry::new(RedisValue::Set(result)));
            }
            Ok(Reply::Int(len as i64))
        }

        // ==================== sorted sets ====================
        "ZADD" => {
            if args.len() < 3 || args.len() % 2 == 0 {
                return Err(StoreError::WrongArity(cmd.to_lowercase()));
            }
            let pairs = args[1..]
                .chunks(2)
                .map(|sm| parse_f64(&sm[0]).map(|score| (score, sm[1].clone())))
                .collect::<StoreResult<Vec<_>>>()?;
            let zset = ks.zset_or_create(&args[0])?;
            let added = pairs
                .into_iter()
                .filter(|(score, member)| zset.insert(member.clone(), *score))
                .count();
            Ok(Reply::Int(added as i64))
        }
        "ZINCRBY" => {
            exact_args(&cmd, args, 3)?;
            let delta = parse_f64(&args[1])?;
            let zset = ks.zset_or_create(&args[0])?;
            let next = zset.score(&args[2]).unwrap_or(0.0) + delta;
            if next.is_nan() {
                return Err(StoreError::InvalidArgument(
                    "resulting score is not a number (NaN)".to_string(),
                ));
            }
            zset.insert(args[2].clone(), next);
            Ok(Reply::Double(next))
        }
        "ZSCORE" => {
            exact_args(&cmd, args, 2)?;
            Ok(match ks.zset(&args[0])?.and_then(|z| z.score(&args[1])) {
                Some(score) => Reply::Double(score),
                None => Reply::Nil,
            })
        }
        "ZCARD" => {
            exact_args(&cmd, args, 1)?;
            Ok(Reply::Int(ks.zset(&args[0])?.map_or(0, SortedSet::len) as i64))
        }
        "ZCOUNT" => {
            exact_args(&cmd, args, 3)?;
            let (min, max) = (parse_score_bound(&args[1])?, parse_score_bound(&args[2])?);
            let count = ks
                .zset(&args[0])?
                .map_or(0, |z| z.score_range(min, max).count());
            Ok(Reply::Int(count as i64))
        }
        "ZRANGE" | "ZREVRANGE" => {
            if args.len() != 3 && !(args.len() == 4 && is_keyword(&args[3], "WITHSCORES")) {
                return Err(StoreError::Syntax);
            }
            let with_scores = args.len() == 4;
            let (start, stop) = (parse_i64(&args[1])?, parse_i64(&args[2])?);
            let picked: Vec<(Vec<u8>, f64)> = match ks.zset(&args[0])? {
                Some(z) => match normalize_range(z.len(), start, stop) {
                    Some((s, e)) => {
                        let ordered: Vec<(&[u8], f64)> = if cmd == "ZREVRANGE" {
                            z.iter().rev().collect()
                        } else {
                            z.iter().collect()
                        };
                        ordered[s..=e].iter().map(|(m, sc)| (m.to_vec(), *sc)).collect()
                    }
                    None => Vec::new(),
                },
                None => Vec::new(),
            };
            Ok(scored_array(picked, with_scores))
        }
        "ZRANGEBYSCORE" | "ZREVRANGEBYSCORE" => {
            min_args(&cmd, args, 3)?;
            let reverse = cmd == "ZREVRANGEBYSCORE";
            // reverse form takes max before min
            let (lo, hi) = if reverse { (&args[2], &args[1]) } else { (&args[1], &args[2]) };
            let (min, max) = (parse_score_bound(lo)?, parse_score_bound(hi)?);
            let opts = parse_range_options(&args[3..], true)?;
            let picked: Vec<(Vec<u8>, f64)> = match ks.zset(&args[0])? {
                Some(z) => {
                    let range = z.score_range(min, max);
                    let iter: Box<dyn Iterator<Item = (&[u8], f64)> + '_> =
                        if reverse { Box::new(range.rev()) } else { Box::new(range) };
                    opts.limit(iter).map(|(m, s)| (m.to_vec(), s)).collect()
                }
                None => Vec::new(),
            };
            Ok(scored_array(picked, opts.with_scores))
        }
        "ZRANGEBYLEX" => {
            min_args(&cmd, args, 3)?;
            let (min, max) = (parse_lex_bound(&args[1])?, parse_lex_bound(&args[2])?);
            let opts = parse_range_options(&args[3..], false)?;
            let picked: Vec<Vec<u8>> = match ks.zset(&args[0])? {
                Some(z) => {
                    let iter = z
                        .iter()
                        .filter(|(m, _)| min.admits_from_below(m) && max.admits_from_above(m));
                    opts.limit(iter).map(|(m, _)| m.to_vec()).collect()
                }
                None => Vec::new(),
            };
            Ok(bulk_array(picked))
        }
        "ZRANK" | "ZREVRANK" => {
            exact_args(&cmd, args, 2)?;
            let rank = ks.zset(&args[0])?.and_then(|z| {
                z.rank(&args[1]).map(|r| if cmd == "ZRANK" { r } else { z.len() - 1 - r })
            });
            Ok(rank.map_or(Reply::Nil, |r| Reply::Int(r as i64)))
        }
        "ZREM" => {
            min_args(&cmd, args, 2)?;
            let removed = match ks.zset_mut(&args[0])? {
                Some(z) => args[1..].iter().filter(|m| z.remove(m)).count(),
                None => 0,
            };
            ks.drop_if_empty(&args[0]);
            Ok(Reply::Int(removed as i64))
        }
        "ZREMRANGEBYRANK" | "ZREMRANGEBYSCORE" => {
            exact_args(&cmd, args, 3)?;
            let victims: Vec<Vec<u8>> = match ks.zset(&args[0])? {
                Some(z) if cmd == "ZREMRANGEBYRANK" => {
                    let (start, stop) = (parse_i64(&args[1])?, parse_i64(&args[2])?);
                    match normalize_range(z.len(), start, stop) {
                        Some((s, e)) => z.iter().skip(s).take(e - s + 1).map(|(m, _)| m.to_vec()).collect(),
                        None => Vec::new(),
                    }
                }
                Some(z) => {
                    let (min, max) = (parse_score_bound(&args[1])?, parse_score_bound(&args[2])?);
                    z.score_range(min, max).map(|(m, _)| m.to_vec()).collect()
                }
                None => Vec::new(),
            };
            if let Some(z) = ks.zset_mut(&args[0])? {
                for m in &victims {
                    z.remove(m);
                }
            }
            ks.drop_if_empty(&args[0]);
            Ok(Reply::Int(victims.len() as i64))
        }
        "ZUNIONSTORE" | "ZINTERSTORE" => zstore(ks, &cmd, args),

        _ => Err(StoreError::UnknownCommand(name.to_string())),
    }
}

/// Pops one element from either end, dropping the list once empty.
pub fn pop(ks: &mut Keyspace, key: &[u8], end: End) -> StoreResult<Option<Vec<u8>>> {
    let popped = match ks.list_mut(key)? {
        Some(list) => match end {
            End::Left => list.pop_front(),
            End::Right => list.pop_back(),
        },
        None => None,
    };
    ks.drop_if_empty(key);
    Ok(popped)
}

/// Moves the tail of `src` to the head of `dst` in one step.
pub fn rpoplpush(ks: &mut Keyspace, src: &[u8], dst: &[u8]) -> StoreResult<Option<Vec<u8>>> {
    // the destination type is checked before anything is popped
    ks.check_type(dst, "list")?;
    let Some(value) = pop(ks, src, End::Right)? else {
        return Ok(None);
    };
    ks.list_or_create(dst)?.push_front(value.clone());
    Ok(Some(value))
}

/// Commands after which a parked list reader may be able to proceed
pub fn grows_lists(name: &str) -> bool {
    matches!(
        name.to_ascii_uppercase().as_str(),
        "LPUSH" | "RPUSH" | "LPUSHX" | "RPUSHX" | "LINSERT" | "RPOPLPUSH" | "BRPOPLPUSH"
    )
}

fn set(ks: &mut Keyspace, cmd: &str, args: &[Vec<u8>]) -> StoreResult<Reply> {
    min_args(cmd, args, 2)?;
    let mut ttl = None;
    let mut only_new = false;
    let mut rest = args[2..].iter();
    while let Some(opt) = rest.next() {
        if is_keyword(opt, "NX") {
            only_new = true;
        } else if is_keyword(opt, "EX") || is_keyword(opt, "PX") {
            let amount = parse_i64(rest.next().ok_or(StoreError::Syntax)?)?;
            if amount <= 0 {
                return Err(StoreError::InvalidArgument(
                    "invalid expire time in 'set' command".to_string(),
                ));
            }
            ttl = Some(if is_keyword(opt, "EX") {
                Duration::from_secs(amount as u64)
            } else {
                Duration::from_millis(amount as u64)
            });
        } else {
            return Err(StoreError::Syntax);
        }
    }
    if only_new && ks.exists(&args[0]) {
        return Ok(Reply::Nil);
    }
    let value = RedisValue::String(args[1].clone());
    let entry = match ttl {
        Some(ttl) => Entry::with_ttl(value, ttl),
        None => Entry::new(value),
    };
    ks.insert(args[0].clone(), entry);
    Ok(Reply::ok())
}

/// Replaces a string value, keeping any expiry the key already had.
fn store_string(ks: &mut Keyspace, key: &[u8], value: Vec<u8>) {
    match ks.entry_mut(key) {
        Some(entry) => entry.value = RedisValue::String(value),
        None => ks.insert(key.to_vec(), Entry::new(RedisValue::String(value))),
    }
}

fn hscan(ks: &mut Keyspace, cmd: &str, args: &[Vec<u8>]) -> StoreResult<Reply> {
    min_args(cmd, args, 2)?;
    let cursor = usize::try_from(parse_i64(&args[1])?)
        .map_err(|_| StoreError::InvalidArgument("invalid cursor".to_string()))?;
    let mut pattern: Option<&[u8]> = None;
    let mut count = 10usize;
    let mut rest = args[2..].iter();
    while let Some(opt) = rest.next() {
        let value = rest.next().ok_or(StoreError::Syntax)?;
        if is_keyword(opt, "MATCH") {
            pattern = Some(value.as_slice());
        } else if is_keyword(opt, "COUNT") {
            count = parse_count(value)?;
            if count == 0 {
                return Err(StoreError::Syntax);
            }
        } else {
            return Err(StoreError::Syntax);
        }
    }

    let mut fields: Vec<(Vec<u8>, Vec<u8>)> = ks
        .hash(&args[0])?
        .map(|h| h.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
        .unwrap_or_default();
    fields.sort();

    let end = cursor.saturating_add(count).min(fields.len());
    let next = if end >= fields.len() { 0 } else { end };
    let batch = fields
        .get(cursor.min(fields.len())..end)
        .unwrap_or_default()
        .iter()
        .filter(|(f, _)| pattern.is_none_or(|p| glob_match(p, f)))
        .flat_map(|(f, v)| [f.clone(), v.clone()]);
    Ok(Reply::Array(vec![
        Reply::Bulk(next.to_string().into_bytes()),
        bulk_array(batch),
    ]))
}

fn set_algebra(ks: &mut Keyspace, op: &str, keys: &[Vec<u8>]) -> StoreResult<HashSet<Vec<u8>>> {
    let mut sets = Vec::with_capacity(keys.len());
    for key in keys {
        sets.push(ks.set(key)?.cloned().unwrap_or_default());
    }
    let mut iter = sets.into_iter();
    let first = iter.next().unwrap_or_default();
    Ok(match op {
        "SDIFF" => iter.fold(first, |acc, s| &acc - &s),
        "SINTER" => iter.fold(first, |acc, s| &acc & &s),
        _ => iter.fold(first, |acc, s| &acc | &s),
    })
}

fn zstore(ks: &mut Keyspace, cmd: &str, args: &[Vec<u8>]) -> StoreResult<Reply> {
    min_args(cmd, args, 3)?;
    let numkeys = parse_count(&args[1])?;
    if numkeys == 0 {
        return Err(StoreError::InvalidArgument(format!(
            "at least 1 input key is needed for '{}' command",
            cmd.to_lowercase()
        )));
    }
    if args.len() < 2 + numkeys {
        return Err(StoreError::Syntax);
    }
    let keys = &args[2..2 + numkeys];

    let mut weights = vec![1.0; numkeys];
    let mut aggregate = "SUM";
    let mut rest = args[2 + numkeys..].iter();
    while let Some(opt) = rest.next() {
        if is_keyword(opt, "WEIGHTS") {
            for w in weights.iter_mut() {
                *w = parse_f64(rest.next().ok_or(StoreError::Syntax)?)
                    .map_err(|_| StoreError::InvalidArgument("weight value is not a float".to_string()))?;
            }
        } else if is_keyword(opt, "AGGREGATE") {
            let value = rest.next().ok_or(StoreError::Syntax)?;
            aggregate = ["SUM", "MIN", "MAX"]
                .into_iter()
                .find(|a| is_keyword(value, a))
                .ok_or(StoreError::Syntax)?;
        } else {
            return Err(StoreError::Syntax);
        }
    }

    // plain sets take part with score 1
    let mut sources: Vec<Vec<(Vec<u8>, f64)>> = Vec::with_capacity(numkeys);
    for key in keys {
        let members = match ks.entry(key).map(|e| &e.value) {
            None => Vec::new(),
            Some(RedisValue::ZSet(z)) => z.iter().map(|(m, s)| (m.to_vec(), s)).collect(),
            Some(RedisValue::Set(s)) => s.iter().map(|m| (m.clone(), 1.0)).collect(),
            Some(_) => return Err(StoreError::WrongType),
        };
        sources.push(members);
    }

    let combine = |acc: f64, score: f64| -> f64 {
        let v = match aggregate {
            "MIN" => acc.min(score),
            "MAX" => acc.max(score),
            _ => acc + score,
        };
        // inf + -inf
        if v.is_nan() { 0.0 } else { v }
    };
    let weighted = |score: f64, weight: f64| -> f64 {
        let v = score * weight;
        if v.is_nan() { 0.0 } else { v }
    };

    let mut acc: HashMap<Vec<u8>, (f64, usize)> = HashMap::new();
    for (source, weight) in sources.into_iter().zip(weights.iter().copied()) {
        for (member, score) in source {
            let score = weighted(score, weight);
            acc.entry(member)
                .and_modify(|(total, seen)| {
                    *total = combine(*total, score);
                    *seen += 1;
                })
                .or_insert((score, 1));
        }
    }

    let mut result = SortedSet::new();
    for (member, (score, seen)) in acc {
        if cmd == "ZUNIONSTORE" || seen == numkeys {
            result.insert(member, score);
        }
    }
    let len = result.len();
    ks.remove(&args[0]);
    if len > 0 {
        ks.insert(args[0].clone(), Entry::new(RedisValue::ZSet(result)));
    }
    Ok(Reply::Int(len as i64))
}

fn lrem(list: &mut VecDeque<Vec<u8>>, count: i64, value: &[u8]) -> usize {
    let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
    let mut removed = 0;
    if count >= 0 {
        let mut i = 0;
        while i < list.len() && removed < limit {
            if list[i] == value {
                list.remove(i);
                removed += 1;
            } else {
                i += 1;
            }
        }
    } else {
        let mut i = list.len();
        while i > 0 && removed < limit {
            i -= 1;
            if list[i] == value {
                list.remove(i);
                removed += 1;
            }
        }
    }
    removed
}

struct RangeOptions {
    with_scores: bool,
    offset: usize,
    count: Option<usize>,
}

impl RangeOptions {
    fn limit<'a, I>(&self, iter: I) -> impl Iterator<Item = (&'a [u8], f64)>
    where
        I: Iterator<Item = (&'a [u8], f64)>,
    {
        iter.skip(self.offset).take(self.count.unwrap_or(usize::MAX))
    }
}

fn parse_range_options(opts: &[Vec<u8>], allow_scores: bool) -> StoreResult<RangeOptions> {
    let mut out = RangeOptions {
        with_scores: false,
        offset: 0,
        count: None,
    };
    let mut rest = opts.iter();
    while let Some(opt) = rest.next() {
        if allow_scores && is_keyword(opt, "WITHSCORES") {
            out.with_scores = true;
        } else if is_keyword(opt, "LIMIT") {
            let offset = parse_i64(rest.next().ok_or(StoreError::Syntax)?)?;
            let count = parse_i64(rest.next().ok_or(StoreError::Syntax)?)?;
            // a negative offset yields nothing, a negative count means "all"
            out.offset = usize::try_from(offset).unwrap_or(usize::MAX);
            out.count = usize::try_from(count).ok();
        } else {
            return Err(StoreError::Syntax);
        }
    }
    Ok(out)
}

enum LexBound {
    NegInf,
    PosInf,
    Inclusive(Vec<u8>),
    Exclusive(Vec<u8>),
}

impl LexBound {
    fn admits_from_below(&self, m: &[u8]) -> bool {
        match self {
            LexBound::NegInf => true,
            LexBound::PosInf => false,
            LexBound::Inclusive(v) => m >= v.as_slice(),
            LexBound::Exclusive(v) => m > v.as_slice(),
        }
    }

    fn admits_from_above(&self, m: &[u8]) -> bool {
        match self {
            LexBound::NegInf => false,
            LexBound::PosInf => true,
            LexBound::Inclusive(v) => m <= v.as_slice(),
            LexBound::Exclusive(v) => m < v.as_slice(),
        }
    }
}

fn parse_lex_bound(raw: &[u8]) -> StoreResult<LexBound> {
    match raw.split_first() {
        Some((b'-', [])) => Ok(LexBound::NegInf),
        Some((b'+', [])) => Ok(LexBound::PosInf),
        Some((b'[', rest)) => Ok(LexBound::Inclusive(rest.to_vec())),
        Some((b'(', rest)) => Ok(LexBound::Exclusive(rest.to_vec())),
        _ => Err(StoreError::BadLexRange),
    }
}

fn parse_score_bound(raw: &[u8]) -> StoreResult<Bound<f64>> {
    let (exclusive, body) = match raw.split_first() {
        Some((b'(', rest)) => (true, rest),
        _ => (false, raw),
    };
    let value = parse_f64(body).map_err(|_| StoreError::BadScoreRange)?;
    Ok(if exclusive {
        Bound::Excluded(value)
    } else {
        Bound::Included(value)
    })
}

/// Inclusive index window shared by LRANGE, LTRIM and ZRANGE.
fn normalize_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { len + index } else { index };
    (0..len).contains(&i).then_some(i as usize)
}

fn is_keyword(arg: &[u8], keyword: &str) -> bool {
    arg.eq_ignore_ascii_case(keyword.as_bytes())
}

fn exact_args(cmd: &str, args: &[Vec<u8>], n: usize) -> StoreResult<()> {
    if args.len() == n {
        Ok(())
    } else {
        Err(StoreError::WrongArity(cmd.to_lowercase()))
    }
}

fn min_args(cmd: &str, args: &[Vec<u8>], n: usize) -> StoreResult<()> {
    if args.len() >= n {
        Ok(())
    } else {
        Err(StoreError::WrongArity(cmd.to_lowercase()))
    }
}

fn parse_i64(raw: &[u8]) -> StoreResult<i64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(StoreError::NotInteger)
}

fn parse_count(raw: &[u8]) -> StoreResult<usize> {
    usize::try_from(parse_i64(raw)?)
        .map_err(|_| StoreError::InvalidArgument("value is out of range, must be positive".to_string()))
}

fn parse_f64(raw: &[u8]) -> StoreResult<f64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| !v.is_nan())
        .ok_or(StoreError::NotFloat)
}

fn finite(v: f64) -> StoreResult<f64> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(StoreError::InvalidArgument("increment would produce NaN or Infinity".to_string()))
    }
}

fn opt_bulk(value: Option<Vec<u8>>) -> Reply {
    value.map_or(Reply::Nil, Reply::Bulk)
}

fn bulk_array(items: impl IntoIterator<Item = Vec<u8>>) -> Reply {
    Reply::Array(items.into_iter().map(Reply::Bulk).collect())
}

fn sorted_bulk_array(set: HashSet<Vec<u8>>) -> Reply {
    let mut items: Vec<_> = set.into_iter().collect();
    items.sort();
    bulk_array(items)
}

fn scored_array(items: Vec<(Vec<u8>, f64)>, with_scores: bool) -> Reply {
    Reply::Array(
        items
            .into_iter()
            .flat_map(|(m, s)| {
                let mut out = vec![Reply::Bulk(m)];
                if with_scores {
                    out.push(Reply::Double(s));
                }
                out
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ks: &mut Keyspace, line: &str) -> StoreResult<Reply> {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap();
        let args: Vec<Vec<u8>> = parts.map(|p| p.as_bytes().to_vec()).collect();
        apply(ks, name, &args)
    }

    fn strings(reply: Reply) -> Vec<String> {
        match reply {
            Reply::Array(items) => items
                .into_iter()
                .map(|r| match r {
                    Reply::Bulk(b) => String::from_utf8(b).unwrap(),
                    Reply::Double(d) => d.to_string(),
                    other => panic!("unexpected {:?}", other),
                })
                .collect(),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_range() {
        assert_eq!(normalize_range(5, 0, -1), Some((0, 4)));
        assert_eq!(normalize_range(5, -2, 100), Some((3, 4)));
        assert_eq!(normalize_range(5, 3, 1), None);
        assert_eq!(normalize_range(5, 7, 9), None);
        assert_eq!(normalize_range(0, 0, -1), None);
        assert_eq!(normalize_range(5, -100, 0), Some((0, 0)));
    }

    #[test]
    fn test_unknown_command_and_arity() {
        let mut ks = Keyspace::default();
        assert_eq!(
            run(&mut ks, "NOPE a").unwrap_err(),
            StoreError::UnknownCommand("NOPE".to_string())
        );
        assert_eq!(
            run(&mut ks, "GET").unwrap_err(),
            StoreError::WrongArity("get".to_string())
        );
    }

    #[test]
    fn test_ltrim_to_empty_deletes_key() {
        let mut ks = Keyspace::default();
        run(&mut ks, "RPUSH l a b c").unwrap();
        run(&mut ks, "LTRIM l 5 10").unwrap();
        assert_eq!(run(&mut ks, "EXISTS l").unwrap(), Reply::Int(0));
    }

    #[test]
    fn test_lrem_from_tail() {
        let mut ks = Keyspace::default();
        run(&mut ks, "RPUSH l a b a c a").unwrap();
        assert_eq!(run(&mut ks, "LREM l -2 a").unwrap(), Reply::Int(2));
        assert_eq!(strings(run(&mut ks, "LRANGE l 0 -1").unwrap()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_rpoplpush_checks_destination_type_first() {
        let mut ks = Keyspace::default();
        run(&mut ks, "RPUSH src a").unwrap();
        run(&mut ks, "SET dst x").unwrap();
        assert_eq!(run(&mut ks, "RPOPLPUSH src dst").unwrap_err(), StoreError::WrongType);
        assert_eq!(run(&mut ks, "LLEN src").unwrap(), Reply::Int(1));
    }

    #[test]
    fn test_zrangebyscore_limit_and_exclusive() {
        let mut ks = Keyspace::default();
        run(&mut ks, "ZADD z 1 a 2 b 3 c 4 d").unwrap();
        assert_eq!(
            strings(run(&mut ks, "ZRANGEBYSCORE z (1 +inf LIMIT 1 2").unwrap()),
            vec!["c", "d"]
        );
        assert_eq!(
            strings(run(&mut ks, "ZREVRANGEBYSCORE z 3 -inf WITHSCORES LIMIT 0 2").unwrap()),
            vec!["c", "3", "b", "2"]
        );
        assert_eq!(
            run(&mut ks, "ZRANGEBYSCORE z abc 3").unwrap_err(),
            StoreError::BadScoreRange
        );
    }

    #[test]
    fn test_zrangebylex() {
        let mut ks = Keyspace::default();
        run(&mut ks, "ZADD z 0 a 0 b 0 c 0 d 0 e").unwrap();
        assert_eq!(strings(run(&mut ks, "ZRANGEBYLEX z [b (d").unwrap()), vec!["b", "c"]);
        assert_eq!(strings(run(&mut ks, "ZRANGEBYLEX z - + LIMIT 3 5").unwrap()), vec!["d", "e"]);
        assert_eq!(run(&mut ks, "ZRANGEBYLEX z b d").unwrap_err(), StoreError::BadLexRange);
    }

    #[test]
    fn test_zunionstore_accepts_plain_sets() {
        let mut ks = Keyspace::default();
        run(&mut ks, "ZADD z 2 m").unwrap();
        run(&mut ks, "SADD s m n").unwrap();
        assert_eq!(run(&mut ks, "ZUNIONSTORE out 2 z s WEIGHTS 1 10").unwrap(), Reply::Int(2));
        assert_eq!(run(&mut ks, "ZSCORE out m").unwrap(), Reply::Double(12.0));
        assert_eq!(run(&mut ks, "ZSCORE out n").unwrap(), Reply::Double(10.0));
    }

    #[test]
    fn test_empty_store_result_removes_destination() {
        let mut ks = Keyspace::default();
        run(&mut ks, "SADD a x").unwrap();
        run(&mut ks, "SADD b y").unwrap();
        run(&mut ks, "SADD dest old").unwrap();
        assert_eq!(run(&mut ks, "SINTERSTORE dest a b").unwrap(), Reply::Int(0));
        assert_eq!(run(&mut ks, "EXISTS dest").unwrap(), Reply::Int(0));
    }

    #[test]
    fn test_hscan_walks_every_field_once() {
        let mut ks = Keyspace::default();
        run(&mut ks, "HSET h f1 1 f2 2 f3 3 g1 4 f5 5").unwrap();
        let mut cursor = "0".to_string();
        let mut seen = Vec::new();
        loop {
            let reply = run(&mut ks, &format!("HSCAN h {} MATCH f* COUNT 2", cursor)).unwrap();
            let Reply::Array(mut parts) = reply else { panic!() };
            let batch = strings(parts.pop().unwrap());
            seen.extend(batch.chunks(2).map(|fv| fv[0].clone()));
            let Reply::Bulk(next) = parts.pop().unwrap() else { panic!() };
            cursor = String::from_utf8(next).unwrap();
            if cursor == "0" {
                break;
            }
        }
        assert_eq!(seen, vec!["f1", "f2", "f3", "f5"]);
    }

    #[test]
    fn test_set_with_nx_and_px() {
        let mut ks = Keyspace::default();
        assert_eq!(run(&mut ks, "SET k v PX 60000").unwrap(), Reply::ok());
        assert_eq!(run(&mut ks, "SET k w NX").unwrap(), Reply::Nil);
        let Reply::Int(ttl) = run(&mut ks, "PTTL k").unwrap() else { panic!() };
        assert!(ttl > 0 && ttl <= 60000);
    }
}
