use rand::prelude::*;
use rand::rngs::SmallRng;

use prosetree::builder::*;
use prosetree::collab::Collab;
use prosetree::versions::{merge_change_sets, rebase_changes, Change, VersionStore, ROOT_VERSION};
use prosetree::{Fragment, Path, Slice, Step, Transform, Visit};

fn random_str(len: usize, rng: &mut SmallRng) -> String {
    let mut str = String::new();
    let alphabet: Vec<char> = "abcdefghijklmnop_".chars().collect();
    for _ in 0..len {
        str.push(alphabet[rng.gen_range(0..alphabet.len())]);
    }
    str
}

/// Every textblock in the document, with its inline size.
fn textblocks(doc: &Node) -> Vec<(Path, usize)> {
    let mut out = Vec::new();
    let end = Pos::new([], doc.size());
    doc.nodes_between(&Pos::new([], 0), &end, &mut |node, path| {
        if node.is_textblock() {
            out.push((path.clone(), node.size()));
            Visit::Skip
        } else {
            Visit::Descend
        }
    });
    out
}

fn insert_step(at: Pos, text: &str) -> Step {
    Step::Replace {
        from: at.clone(),
        to: at,
        slice: Slice::new(Fragment::inline(vec![txt(text)]), 0, 0),
        structure: false,
    }
}

fn random_inline_pos(blocks: &[(Path, usize)], rng: &mut SmallRng) -> Pos {
    let (path, size) = &blocks[rng.gen_range(0..blocks.len())];
    Pos { path: path.clone(), offset: rng.gen_range(0..=*size) }
}

/// A random step against `doc`. Not every step produced here applies; callers
/// tolerate failures. `with_marks` also generates mark steps, which don't
/// survive an invert round-trip when ranges already carry the mark.
fn make_random_step(doc: &Node, rng: &mut SmallRng, with_marks: bool) -> Step {
    let blocks = textblocks(doc);
    if blocks.is_empty() {
        // Deletions emptied the document; put a paragraph back.
        return Step::Replace {
            from: Pos::new([], 0),
            to: Pos::new([], 0),
            slice: Slice::new(Fragment::new(vec![p(&random_str(2, rng))]), 0, 0),
            structure: false,
        };
    }
    let limit = if with_marks { 10 } else { 9 };
    match rng.gen_range(0..limit) {
        0..=4 => {
            let len = rng.gen_range(1..=3);
            insert_step(random_inline_pos(&blocks, rng), &random_str(len, rng))
        }
        5 | 6 => {
            let a = random_inline_pos(&blocks, rng);
            let b = random_inline_pos(&blocks, rng);
            let (from, to) = if a <= b { (a, b) } else { (b, a) };
            Step::Replace { from, to, slice: Slice::empty(), structure: false }
        }
        7 => {
            let splittable: Vec<_> = blocks.iter().filter(|(_, size)| *size >= 2).collect();
            match splittable.get(rng.gen_range(0..splittable.len().max(1))) {
                Some((path, size)) => Step::Split {
                    pos: Pos { path: path.clone(), offset: rng.gen_range(1..*size) },
                    retype: None,
                },
                None => insert_step(random_inline_pos(&blocks, rng), &random_str(1, rng)),
            }
        }
        8 => {
            let joinable: Vec<_> = blocks
                .iter()
                .filter(|(path, _)| *path.last().unwrap() > 0)
                .collect();
            match joinable.get(rng.gen_range(0..joinable.len().max(1))) {
                Some((path, _)) => {
                    let mut prev = path.clone();
                    let last = prev.len() - 1;
                    prev[last] -= 1;
                    let prev_size = doc.node_at(&prev).map_or(0, |n| n.size());
                    Step::Join {
                        from: Pos { path: prev, offset: prev_size },
                        to: Pos { path: path.clone(), offset: 0 },
                    }
                }
                None => insert_step(random_inline_pos(&blocks, rng), &random_str(1, rng)),
            }
        }
        _ => {
            let (path, size) = blocks[rng.gen_range(0..blocks.len())].clone();
            let mut a = rng.gen_range(0..=size);
            let mut b = rng.gen_range(0..=size);
            if a > b {
                std::mem::swap(&mut a, &mut b);
            }
            let mark = if rng.gen_bool(0.5) { Mark::Em } else { Mark::Strong };
            let from = Pos { path: path.clone(), offset: a };
            let to = Pos { path, offset: b };
            if rng.gen_bool(0.7) {
                Step::AddMark { from, to, mark }
            } else {
                Step::RemoveMark { from, to, mark }
            }
        }
    }
}

fn start_doc() -> Node {
    doc(vec![
        p("one two three"),
        blockquote(vec![p("quoted"), p("deeper text")]),
        ul(vec![li(vec![p("item a")]), li(vec![p("item b")])]),
        p("tail"),
    ])
}

#[test]
fn fuzz_single_transform_invert() {
    for seed in 0..30 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let base = start_doc();
        let mut tr = Transform::new(base.clone());

        for _i in 0..40 {
            let step = make_random_step(tr.doc(), &mut rng, false);
            tr.maybe_step(step);
            tr.doc().check();
        }

        let mut undo = Transform::new(tr.doc().clone());
        for step in tr.inverted_steps() {
            undo.step(step).unwrap();
            undo.doc().check();
        }
        assert_eq!(undo.doc(), &base, "seed {} did not round-trip", seed);
    }
}

#[test]
fn fuzz_collab_convergence() {
    for seed in 0..20 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let base = start_doc();

        // The authority is plain: a linear log, append only when caught up.
        let mut central_doc = base.clone();
        let mut log: Vec<Step> = Vec::new();
        let mut clients = [Collab::new(base.clone()), Collab::new(base)];

        for _i in 0..100 {
            let idx = rng.gen_range(0..clients.len());
            let client = &mut clients[idx];

            match rng.gen_range(0..4) {
                0 | 1 => {
                    let mut tr = Transform::new(client.doc().clone());
                    let step = make_random_step(tr.doc(), &mut rng, true);
                    if tr.maybe_step(step) {
                        client.apply_transform(&tr);
                    }
                }
                2 => {
                    if let Some(sendable) = client.sendable_steps() {
                        if sendable.version == log.len() as u64 {
                            for step in &sendable.steps {
                                let result = step.apply(&central_doc).unwrap();
                                central_doc = result.doc;
                            }
                            log.extend(sendable.steps.iter().cloned());
                            client.confirm_steps(&sendable);
                        }
                    }
                }
                _ => {
                    let have = client.version() as usize;
                    if have < log.len() {
                        client.receive(&log[have..]);
                    }
                }
            }
            clients[idx].doc().check();
        }

        // Drain everything.
        loop {
            let mut busy = false;
            for client in clients.iter_mut() {
                let have = client.version() as usize;
                if have < log.len() {
                    client.receive(&log[have..]);
                    busy = true;
                }
                if let Some(sendable) = client.sendable_steps() {
                    busy = true;
                    if sendable.version == log.len() as u64 {
                        for step in &sendable.steps {
                            let result = step.apply(&central_doc).unwrap();
                            central_doc = result.doc;
                        }
                        log.extend(sendable.steps.iter().cloned());
                        client.confirm_steps(&sendable);
                    }
                }
            }
            if !busy {
                break;
            }
        }

        for client in &clients {
            assert_eq!(client.doc(), &central_doc, "seed {} diverged", seed);
            client.doc().check();
        }
    }
}

#[test]
fn fuzz_version_store_convergence() {
    for seed in 0..20 {
        let mut rng = SmallRng::seed_from_u64(seed);
        let base = start_doc();
        let mut left = VersionStore::new(base.clone());
        let mut right = VersionStore::new(base);

        let mut make_chain = |store: &mut VersionStore, client, rng: &mut SmallRng| {
            let mut tip = ROOT_VERSION;
            let mut chain = Vec::new();
            let count = rng.gen_range(1..=5);
            while chain.len() < count {
                let step = make_random_step(store.doc(tip), rng, true);
                let change = Change {
                    id: VersionStore::fresh_edit_id(rng),
                    base: tip,
                    client,
                    step,
                };
                if let Some(new_tip) = store.apply_change(change.clone()) {
                    chain.push(change);
                    tip = new_tip;
                }
            }
            chain
        };

        let left_chain = make_chain(&mut left, 1, &mut rng);
        let right_chain = make_chain(&mut right, 2, &mut rng);

        let merged_left = merge_change_sets(left_chain.clone(), right_chain.clone());
        let merged_right = merge_change_sets(right_chain, left_chain);
        assert_eq!(merged_left, merged_right);

        let left_tip = rebase_changes(&mut left, ROOT_VERSION, merged_left);
        let right_tip = rebase_changes(&mut right, ROOT_VERSION, merged_right);

        assert_eq!(left_tip, right_tip, "seed {} tips diverged", seed);
        assert_eq!(left.doc(left_tip), right.doc(right_tip), "seed {} docs diverged", seed);
        left.doc(left_tip).check();

        left.clean_up(left_tip);
        assert_eq!(left.len(), 1);
        assert!(left.contains(left_tip));
    }
}
