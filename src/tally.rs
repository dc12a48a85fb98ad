use std::collections::{HashMap, HashSet};

use crate::time_entry::TimeEntry;

/// プロジェクトごとに集計した経過時間(ミリ秒)。
///
/// `total`は常に`billable + non_billable`と等しい。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Durations {
    pub total: i64,
    pub billable: i64,
    pub non_billable: i64,
}

impl Durations {
    /// 経過時間を加算する。
    pub fn add(&mut self, duration: i64, billable: bool) {
        self.total += duration;
        if billable {
            self.billable += duration;
        } else {
            self.non_billable += duration;
        }
    }
}

/// プロジェクト名から`Durations`への対応。
///
/// 反復順はプロジェクトが最初に現れた順とする。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProjectTally {
    projects: Vec<(String, Durations)>,
    index: HashMap<String, usize>,
}

impl ProjectTally {
    /// time entryをプロジェクトごとに集計する。
    ///
    /// `user_ids`が空の場合は全てのtime entryを対象とし、
    /// そうでない場合は含まれるユーザーのtime entryのみを対象とする。
    ///
    /// # Arguments
    ///
    /// * `entries` - 集計するtime entry
    /// * `user_ids` - 集計対象とするユーザーのid
    pub fn aggregate(entries: &[TimeEntry], user_ids: &HashSet<u64>) -> Self {
        entries
            .iter()
            .filter(|entry| user_ids.is_empty() || user_ids.contains(&entry.user_id))
            .fold(Self::default(), |mut tally, entry| {
                tally
                    .entry(entry.project_name())
                    .add(entry.duration, entry.is_billable());
                tally
            })
    }

    /// 最初に現れた順にプロジェクトと集計結果を返す。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Durations)> {
        self.projects
            .iter()
            .map(|(project, durations)| (project.as_str(), durations))
    }

    fn entry(&mut self, project: &str) -> &mut Durations {
        let i = match self.index.get(project) {
            Some(&i) => i,
            None => {
                self.projects.push((project.to_string(), Durations::default()));
                self.index.insert(project.to_string(), self.projects.len() - 1);
                self.projects.len() - 1
            }
        };
        &mut self.projects[i].1
    }
}

// 集計結果を比較するテスト用の補助関数。
#[cfg(test)]
impl Durations {
    /// 別の集計結果を加算する。
    pub fn merge(&mut self, other: &Durations) {
        self.total += other.total;
        self.billable += other.billable;
        self.non_billable += other.non_billable;
    }
}

#[cfg(test)]
impl ProjectTally {
    /// 複数の集計結果をプロジェクトごとに合算する。
    ///
    /// プロジェクトの順序は、先に渡された集計結果で最初に現れた順となる。
    pub fn sum<'a, I>(tallies: I) -> Self
    where
        I: IntoIterator<Item = &'a ProjectTally>,
    {
        tallies
            .into_iter()
            .fold(Self::default(), |mut acc, tally| {
                tally
                    .iter()
                    .for_each(|(project, durations)| acc.entry(project).merge(durations));
                acc
            })
    }

    /// プロジェクトの集計結果を返す。
    pub fn get(&self, project: &str) -> Option<&Durations> {
        self.index.get(project).map(|&i| &self.projects[i].1)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}
