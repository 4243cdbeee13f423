//! Standings accumulation and leaderboard ordering

/// Match points awarded per outcome
pub const WIN_POINTS: u32 = 3;
pub const DRAW_POINTS: u32 = 1;
/// A bye counts as a win's worth of match points
pub const BYE_POINTS: u32 = 3;
/// Substituted score for a forfeited fixture (winner, loser)
pub const FORFEIT_SCORE: (u32, u32) = (5, 0);

/// One player's accumulated tournament record
#[derive(Debug, Clone)]
pub struct Standing {
    pub player_id: i64,
    pub match_points: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub matches_played: u32,
    /// Own score minus opponent score, summed across matches
    pub score_differential: i64,
    pub total_points_scored: u64,
    pub byes_taken: u32,
    pub opponents_faced: Vec<i64>,
}

impl Standing {
    pub fn new(player_id: i64) -> Self {
        Self {
            player_id,
            match_points: 0,
            wins: 0,
            draws: 0,
            losses: 0,
            matches_played: 0,
            score_differential: 0,
            total_points_scored: 0,
            byes_taken: 0,
            opponents_faced: Vec::new(),
        }
    }

    /// A bye awards match points and is tracked, but touches neither the
    /// score differential nor the opponent history.
    pub fn record_bye(&mut self) {
        self.match_points += BYE_POINTS;
        self.byes_taken += 1;
    }

    /// Record one completed fixture from this player's perspective
    pub fn record_result(&mut self, own: u32, opponent_score: u32, opponent_id: i64) {
        self.matches_played += 1;
        self.opponents_faced.push(opponent_id);
        self.total_points_scored += own as u64;
        self.score_differential += own as i64 - opponent_score as i64;

        if own > opponent_score {
            self.wins += 1;
            self.match_points += WIN_POINTS;
        } else if own < opponent_score {
            self.losses += 1;
        } else {
            self.draws += 1;
            self.match_points += DRAW_POINTS;
        }
    }

    pub fn has_played(&self, opponent_id: i64) -> bool {
        self.opponents_faced.contains(&opponent_id)
    }

    /// Differential per match, rounded to 2 decimals (first tie-break)
    pub fn avg_score_differential(&self) -> f64 {
        if self.matches_played == 0 {
            return 0.0;
        }
        round2(self.score_differential as f64 / self.matches_played as f64)
    }

    /// Points scored per match, rounded to 2 decimals (second tie-break)
    pub fn avg_points_scored(&self) -> f64 {
        if self.matches_played == 0 {
            return 0.0;
        }
        round2(self.total_points_scored as f64 / self.matches_played as f64)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Sort standings into leaderboard order: match points desc, then average
/// score differential desc, then average points scored desc. The sort is
/// stable, so re-sorting without intervening updates is idempotent.
pub fn leaderboard_order(standings: &mut [&Standing]) {
    standings.sort_by(|a, b| {
        b.match_points
            .cmp(&a.match_points)
            .then_with(|| {
                b.avg_score_differential()
                    .total_cmp(&a.avg_score_differential())
            })
            .then_with(|| b.avg_points_scored().total_cmp(&a.avg_points_scored()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn win_draw_loss_points() {
        let mut s = Standing::new(1);
        s.record_result(7, 3, 2);
        assert_eq!(s.match_points, 3);
        assert_eq!(s.wins, 1);
        assert_eq!(s.score_differential, 4);

        s.record_result(2, 2, 3);
        assert_eq!(s.match_points, 4);
        assert_eq!(s.draws, 1);

        s.record_result(1, 5, 4);
        assert_eq!(s.match_points, 4);
        assert_eq!(s.losses, 1);
        assert_eq!(s.score_differential, 0);
        assert_eq!(s.total_points_scored, 10);
        assert_eq!(s.opponents_faced, vec![2, 3, 4]);
    }

    #[test]
    fn bye_awards_points_without_differential() {
        let mut s = Standing::new(1);
        s.record_bye();
        assert_eq!(s.match_points, BYE_POINTS);
        assert_eq!(s.byes_taken, 1);
        assert_eq!(s.score_differential, 0);
        assert_eq!(s.matches_played, 0);
        assert!(s.opponents_faced.is_empty());
    }

    #[test]
    fn leaderboard_breaks_ties_by_avg_differential_then_avg_scored() {
        let mut a = Standing::new(1);
        a.record_result(5, 0, 9); // 3 pts, diff +5
        let mut b = Standing::new(2);
        b.record_result(3, 1, 9); // 3 pts, diff +2
        let mut c = Standing::new(3);
        c.record_result(6, 4, 9); // 3 pts, diff +2, more scored
        let mut d = Standing::new(4);
        d.record_result(0, 1, 9); // 0 pts

        let mut order: Vec<&Standing> = vec![&d, &b, &c, &a];
        leaderboard_order(&mut order);
        let ids: Vec<i64> = order.iter().map(|s| s.player_id).collect();
        assert_eq!(ids, vec![1, 3, 2, 4]);
    }

    #[test]
    fn leaderboard_is_idempotent_under_resort() {
        let mut a = Standing::new(1);
        a.record_result(2, 2, 2);
        let mut b = Standing::new(2);
        b.record_result(2, 2, 1);

        let mut first: Vec<&Standing> = vec![&a, &b];
        leaderboard_order(&mut first);
        let first_ids: Vec<i64> = first.iter().map(|s| s.player_id).collect();

        let mut second: Vec<&Standing> = first.clone();
        leaderboard_order(&mut second);
        let second_ids: Vec<i64> = second.iter().map(|s| s.player_id).collect();

        assert_eq!(first_ids, second_ids);
    }
}
