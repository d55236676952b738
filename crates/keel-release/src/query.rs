//! Release read model

use std::collections::{BTreeMap, HashSet};

use futures::future::try_join_all;
use keel_core::models::{
    field_key, ChartFile, LabelSelector, ReleaseInfo, ReleaseRecord, ReleaseRequest, ReleaseSpec,
    ReleaseTaskPointer, Values,
};
use keel_core::Result;
use tracing::error;

use crate::manager::ReleaseManager;

impl ReleaseManager {
    /// Current view of one release, decorated with its latest task's state
    pub async fn get_release(&self, namespace: &str, name: &str) -> Result<ReleaseInfo> {
        let pointer = self.cache.get_release_task(namespace, name).await?;
        let record = match self.cache.get_release_record(namespace, name).await {
            Ok(record) => Some(record),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        self.build_info_by_task(pointer, record).await
    }

    /// Every release of `namespace`, or of all namespaces
    pub async fn list_releases(&self, namespace: Option<&str>) -> Result<Vec<ReleaseInfo>> {
        let pointers = self.cache.get_release_tasks(namespace).await?;
        let records = self.cache.get_release_records(namespace).await?;
        self.build_infos(pointers, records).await
    }

    /// Releases whose release config labels match `selector` (`k=v[,k=v]`)
    pub async fn list_releases_by_labels(
        &self,
        namespace: Option<&str>,
        selector: &str,
    ) -> Result<Vec<ReleaseInfo>> {
        let selector = LabelSelector::parse(selector)?;
        let configs = self
            .cluster
            .list_release_configs(namespace, &selector)
            .await
            .map_err(|e| {
                error!(error = %e, selector = %selector, "failed to list release configs");
                e
            })?;
        let keys: HashSet<String> = configs
            .iter()
            .map(|c| field_key(&c.namespace, &c.name))
            .collect();

        let pointers = self
            .cache
            .get_release_tasks(namespace)
            .await?
            .into_iter()
            .filter(|p| keys.contains(&p.key()))
            .collect();
        let records = self
            .cache
            .get_release_records(namespace)
            .await?
            .into_iter()
            .filter(|r| keys.contains(&r.key()))
            .collect();
        self.build_infos(pointers, records).await
    }

    /// Render the request without applying it and materialize the manifest
    pub async fn dry_run_release(
        &self,
        namespace: &str,
        request: &ReleaseRequest,
        chart_files: &[ChartFile],
    ) -> Result<Vec<Values>> {
        request.validate(chart_files)?;
        let record = self
            .do_install_upgrade(namespace, request, chart_files, true, None)
            .await?;
        self.cluster
            .build_manifest_objects(namespace, &record.manifest)
            .await
    }

    async fn build_infos(
        &self,
        pointers: Vec<ReleaseTaskPointer>,
        records: Vec<ReleaseRecord>,
    ) -> Result<Vec<ReleaseInfo>> {
        let mut records: BTreeMap<String, ReleaseRecord> =
            records.into_iter().map(|r| (r.key(), r)).collect();
        let work = pointers.into_iter().map(|pointer| {
            let record = records.remove(&pointer.key());
            self.build_info_by_task(pointer, record)
        });
        try_join_all(work).await
    }

    pub(crate) async fn build_info_by_task(
        &self,
        pointer: ReleaseTaskPointer,
        record: Option<ReleaseRecord>,
    ) -> Result<ReleaseInfo> {
        let mut info = match &record {
            Some(record) => self.build_release_info(record).await?,
            None => ReleaseInfo {
                spec: ReleaseSpec {
                    namespace: pointer.namespace.clone(),
                    name: pointer.name.clone(),
                    ..Default::default()
                },
                ..Default::default()
            },
        };

        let Some(signature) = pointer.latest_task_signature.as_ref() else {
            return Ok(info);
        };
        match self.executor.get_task_state(signature).await {
            Ok(state) if !state.is_finished() => {
                info.ready = false;
                info.message = format!(
                    "please wait for the release latest task {} finished",
                    signature.label()
                );
            }
            Ok(state) if !state.is_success() => {
                info.ready = false;
                info.message = format!(
                    "the release latest task {} failed : {}",
                    signature.label(),
                    state.error_msg()
                );
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                error!(release = %pointer.key(), error = %e, "failed to get release task state");
                return Err(e);
            }
        }
        Ok(info)
    }
}
