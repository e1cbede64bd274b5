use std::{cmp::Reverse, collections::BinaryHeap};

use crate::models::slack::Message;

/// Sorts by `ts` and drops repeated timestamps, keeping the first occurrence.
pub fn normalize(mut messages: Vec<Message>) -> Vec<Message> {
    if !messages.is_sorted_by(|a, b| a.ts <= b.ts) {
        messages.sort_by(|a, b| a.ts.cmp(&b.ts));
    }
    messages.dedup_by(|later, earlier| later.ts == earlier.ts);
    messages
}

/// K-way merge of sequences already sorted by `ts`.
///
/// Each timestamp is emitted once. On a tie the earlier sequence wins, so
/// passing the channel's top-level messages first keeps the channel copy of a
/// thread parent.
pub fn merge_by_ts(streams: Vec<Vec<Message>>) -> Vec<Message> {
    let total = streams.iter().map(Vec::len).sum();
    let mut streams: Vec<_> = streams
        .into_iter()
        .map(|stream| stream.into_iter().peekable())
        .collect();

    let mut heap = BinaryHeap::with_capacity(streams.len());
    for (index, stream) in streams.iter_mut().enumerate() {
        if let Some(head) = stream.peek() {
            heap.push(Reverse((head.ts.clone(), index)));
        }
    }

    let mut merged: Vec<Message> = Vec::with_capacity(total);
    while let Some(Reverse((_, index))) = heap.pop() {
        let Some(message) = streams[index].next() else {
            continue;
        };
        if let Some(head) = streams[index].peek() {
            heap.push(Reverse((head.ts.clone(), index)));
        }

        if merged.last().is_some_and(|last| last.ts == message.ts) {
            continue;
        }
        merged.push(message);
    }

    merged
}
