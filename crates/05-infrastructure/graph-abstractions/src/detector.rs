//! 循环依赖检测

use std::collections::{HashMap, HashSet};
use tether_common::Key;

/// 依赖图节点
#[derive(Debug, Clone)]
pub struct DependencyGraphNode {
    /// 绑定键
    pub key: Key,
    /// 声明的依赖
    pub dependencies: Vec<Key>,
}

/// 循环依赖检测器
pub trait CycleDetector: Send + Sync {
    /// 从指定键出发查找环，返回首尾相同的环路径
    fn find_cycle_from(&self, start: &Key, dependencies_of: &dyn Fn(&Key) -> Vec<Key>)
        -> Option<Vec<Key>>;

    /// 查找整张图中的所有环（按键集合去重）
    fn find_all_cycles(&self, graph: &[DependencyGraphNode]) -> Vec<Vec<Key>> {
        let index: HashMap<&Key, &[Key]> = graph
            .iter()
            .map(|node| (&node.key, node.dependencies.as_slice()))
            .collect();
        let dependencies_of =
            |key: &Key| index.get(key).map(|deps| deps.to_vec()).unwrap_or_default();

        let mut seen: Vec<HashSet<Key>> = Vec::new();
        let mut cycles = Vec::new();
        for node in graph {
            if let Some(cycle) = self.find_cycle_from(&node.key, &dependencies_of) {
                let members: HashSet<Key> = cycle.iter().cloned().collect();
                if !seen.contains(&members) {
                    seen.push(members);
                    cycles.push(cycle);
                }
            }
        }
        cycles
    }
}

/// 默认循环依赖检测器
///
/// 使用显式栈的深度优先搜索，环的深度不受调用栈限制
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCycleDetector;

impl CycleDetector for DefaultCycleDetector {
    fn find_cycle_from(
        &self,
        start: &Key,
        dependencies_of: &dyn Fn(&Key) -> Vec<Key>,
    ) -> Option<Vec<Key>> {
        let mut visited: HashSet<Key> = HashSet::new();
        let mut on_path: HashSet<Key> = HashSet::new();
        let mut path: Vec<Key> = vec![start.clone()];
        let mut stack: Vec<(Key, Vec<Key>, usize)> =
            vec![(start.clone(), dependencies_of(start), 0)];
        on_path.insert(start.clone());

        loop {
            let next = match stack.last_mut() {
                None => break,
                Some((_, deps, cursor)) => {
                    if *cursor < deps.len() {
                        *cursor += 1;
                        Some(deps[*cursor - 1].clone())
                    } else {
                        None
                    }
                }
            };

            match next {
                Some(next) if on_path.contains(&next) => {
                    let start_at = path.iter().position(|key| *key == next).unwrap_or(0);
                    let mut cycle = path[start_at..].to_vec();
                    cycle.push(next);
                    return Some(cycle);
                }
                Some(next) if visited.contains(&next) => {}
                Some(next) => {
                    let deps = dependencies_of(&next);
                    path.push(next.clone());
                    on_path.insert(next.clone());
                    stack.push((next, deps, 0));
                }
                None => {
                    if let Some((done, _, _)) = stack.pop() {
                        path.pop();
                        on_path.remove(&done);
                        visited.insert(done);
                    }
                }
            }
        }

        None
    }
}
