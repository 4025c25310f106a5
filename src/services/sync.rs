use color_eyre::eyre::{Result, WrapErr, eyre};
use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::ports::spotify::PlaylistClient;
use crate::services::ranking::CandidateTrack;

/// What to do when a single candidate cannot be added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// Stop the run at the first failed candidate
    #[default]
    Abort,
    /// Record the failure and keep going
    Continue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedTrack {
    pub track_id: String,
    pub snapshot_id: String,
}

#[derive(Debug, Clone)]
pub struct FailedCandidate {
    pub candidate: CandidateTrack,
    pub reason: String,
}

/// Result of a playlist sync run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub playlist_name: String,
    pub added: Vec<AddedTrack>,
    pub failed: Vec<FailedCandidate>,
}

/// Pushes ranked candidates onto a remote playlist, in order.
///
/// Nothing is deduplicated: tracks already on the playlist are added again.
pub struct PlaylistSyncService<'a> {
    client: &'a dyn PlaylistClient,
    playlist_id: String,
    on_error: OnError,
}

impl<'a> PlaylistSyncService<'a> {
    pub fn new(client: &'a dyn PlaylistClient, playlist_id: String, on_error: OnError) -> Self {
        Self {
            client,
            playlist_id,
            on_error,
        }
    }

    /// Candidate stream errors and a failing playlist lookup always end the run.
    pub async fn sync<S>(&self, candidates: S) -> Result<SyncReport>
    where
        S: Stream<Item = Result<CandidateTrack>>,
    {
        let playlist = self.client.get_playlist(&self.playlist_id).await?;
        tracing::info!(
            "Syncing ranked tracks into {} ({} tracks, snapshot {})",
            playlist.name,
            playlist.total_tracks,
            playlist.snapshot_id
        );

        let mut report = SyncReport {
            playlist_name: playlist.name,
            added: Vec::new(),
            failed: Vec::new(),
        };

        futures::pin_mut!(candidates);
        while let Some(candidate) = candidates.try_next().await? {
            match self.add_candidate(&candidate).await {
                Ok(added) => {
                    tracing::info!(
                        "Added {} to {} with SnapshotID {}",
                        added.track_id,
                        report.playlist_name,
                        added.snapshot_id
                    );
                    report.added.push(added);
                }
                Err(error) => match self.on_error {
                    OnError::Abort => {
                        return Err(error.wrap_err(format!(
                            "Sync aborted after adding {} tracks",
                            report.added.len()
                        )));
                    }
                    OnError::Continue => {
                        tracing::warn!("Skipping {}: {:#}", candidate.external_id, error);
                        report.failed.push(FailedCandidate {
                            candidate,
                            reason: format!("{:#}", error),
                        });
                    }
                },
            }
        }

        tracing::info!(
            "Sync finished: {} added, {} failed",
            report.added.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn add_candidate(&self, candidate: &CandidateTrack) -> Result<AddedTrack> {
        let track_id = candidate
            .track_id()
            .ok_or_else(|| eyre!("Malformed composite id: {}", candidate.external_id))?;

        let snapshot_id = self
            .client
            .add_track(&self.playlist_id, track_id)
            .await
            .wrap_err_with(|| format!("Failed to add item {}", candidate.item_id))?;

        Ok(AddedTrack {
            track_id: track_id.to_string(),
            snapshot_id,
        })
    }
}

/// Log what a sync would add, without touching the remote playlist.
pub async fn preview<S>(candidates: S) -> Result<Vec<CandidateTrack>>
where
    S: Stream<Item = Result<CandidateTrack>>,
{
    let candidates: Vec<CandidateTrack> = candidates.try_collect().await?;
    for (rank, candidate) in candidates.iter().enumerate() {
        match candidate.track_id() {
            Some(track_id) => tracing::info!(
                "#{} score {}: would add {}",
                rank + 1,
                candidate.score,
                track_id
            ),
            None => tracing::warn!(
                "#{} score {}: malformed composite id {}",
                rank + 1,
                candidate.score,
                candidate.external_id
            ),
        }
    }
    Ok(candidates)
}
